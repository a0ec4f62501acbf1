//! InfluxQL query front end
//!
//! - **Scanner**: tokens and positions from query text
//! - **Parser**: statements and expressions, dispatched through a keyword trie
//! - **AST**: statement types that render back to canonical query text
//! - **Analysis**: type evaluation, constant folding, regex rewriting and
//!   time-range extraction from WHERE clauses
//!
//! # Query Language
//!
//! ```text
//! SELECT <fields> [INTO <target>] FROM <sources>
//! [WHERE <condition>]
//! [GROUP BY <dimensions>] [fill(<option>)]
//! [ORDER BY time [ASC|DESC]]
//! [LIMIT n] [OFFSET n] [SLIMIT n] [SOFFSET n]
//! [tz('<zone>')]
//! ```
//!
//! # Examples
//!
//! ```rust
//! use influxql::query::{parse_statement, Statement};
//!
//! let stmt = parse_statement("SELECT mean(v) FROM cpu WHERE host = 'a' GROUP BY time(1m)").unwrap();
//! assert!(matches!(stmt, Statement::Select(_)));
//! assert_eq!(stmt.to_string(), "SELECT mean(v) FROM cpu WHERE host = 'a' GROUP BY time(1m)");
//! ```

pub mod ast;
pub mod data_type;
pub mod duration;
pub mod error;
pub mod eval;
pub mod expr;
pub mod params;
pub mod parse_tree;
pub mod parser;
pub mod quote;
pub mod reduce;
pub mod regex_rewrite;
pub mod scanner;
pub mod select;
pub mod source;
pub mod time_range;
pub mod timestamp;
pub mod token;
pub mod types;
pub mod walk;

pub use ast::{ExecutionPrivilege, Privilege, Query, Statement};
pub use data_type::DataType;
pub use duration::{format_duration, parse_duration};
pub use error::{ParseError, QueryError, QueryResult, TypeError};
pub use eval::{eval, eval_bool, MapValuer, MultiValuer, NowValuer, Value, Valuer, ValuerEval};
pub use expr::{BinaryExpr, Call, Dimension, Expr, Field, RegexLiteral, VarRef, WildcardType};
pub use params::{bind_params, BoundValue, Params};
pub use parser::{parse_expr, parse_query, parse_statement, Parser};
pub use reduce::reduce;
pub use select::{FillOption, SelectStatement, SortField};
pub use source::{Measurement, Source};
pub use time_range::{condition_expr, TimeRange};
pub use token::Token;
pub use types::{eval_type, FieldMapper, MultiTypeMapper, TypeMapper, TypeValuerEval};
pub use walk::{rewrite_expr, rewrite_func, walk, walk_fn, Node, Rewriter, Visitor};
