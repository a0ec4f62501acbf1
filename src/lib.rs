//! # InfluxQL
//!
//! Front end for the InfluxQL time-series query language: scanning, parsing
//! into a typed AST, canonical re-serialization and the static passes run
//! before a query is planned.
//!
//! ## Features
//!
//! - **Parsing**: every statement of the language, with bound `$name` parameters
//! - **Type evaluation**: result types of expressions against a schema mapper
//! - **Constant folding**: literals, `now()` and time arithmetic
//! - **Time ranges**: WHERE clauses split into a time range and a residual condition
//! - **Regex rewriting**: anchored alternations become plain comparisons
//!
//! ## Modules
//!
//! - [`query`]: Scanner, parser, AST and analysis passes
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use influxql::query::{condition_expr, parse_expr, parse_statement, NowValuer};
//!
//! let stmt = parse_statement("SELECT mean(v) FROM cpu GROUP BY time(10m)").unwrap();
//! assert_eq!(stmt.to_string(), "SELECT mean(v) FROM cpu GROUP BY time(10m)");
//!
//! let now = NowValuer::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
//! let cond = parse_expr("host = 'a' AND time >= now() - 1h").unwrap();
//! let (residual, range) = condition_expr(&cond, Some(&now)).unwrap();
//! assert_eq!(residual.unwrap().to_string(), "host = 'a'");
//! assert_eq!(range.min, Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap()));
//! ```

pub mod config;
pub mod query;

// Re-export top-level types for convenience
pub use query::{
    parse_expr, parse_query, parse_statement, Expr, ParseError, Parser, Query, QueryError,
    QueryResult, Statement,
};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig, QueryConfig};
