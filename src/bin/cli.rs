//! InfluxQL CLI
//!
//! Command-line interface for the query front end:
//! - Parse and re-serialize queries
//! - Show required privileges
//! - Fold constants and split WHERE clauses into time ranges
//! - Rewrite regex conditions

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser as ClapParser, Subcommand};
use serde_json::{json, Map, Value as JsonValue};
use tracing_subscriber::EnvFilter;

use influxql::config::{generate_default_config, Config, LoggingConfig};
use influxql::query::{
    condition_expr, reduce, Expr, MapValuer, MultiValuer, NowValuer, Parser, Query, Statement,
    Value, Valuer, ValuerEval,
};

#[derive(ClapParser)]
#[command(name = "influxql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parse and analyze InfluxQL queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Bound parameter as name=value; the value is read as JSON, else as a string
    #[arg(short = 'p', long = "param", global = true)]
    pub params: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a query and print each statement in canonical form
    Parse {
        query: String,
    },

    /// Print the privileges each statement requires
    Privileges {
        query: String,
    },

    /// Fold constants in an expression
    Reduce {
        expr: String,
        /// Value of now() as RFC3339 (default: current time)
        #[arg(long)]
        now: Option<String>,
    },

    /// Split a WHERE condition into a time range and the remaining condition
    Condition {
        expr: String,
        /// Value of now() as RFC3339 (default: current time)
        #[arg(long)]
        now: Option<String>,
    },

    /// Evaluate an expression
    Eval {
        expr: String,
        /// Value of now() as RFC3339 (default: current time)
        #[arg(long)]
        now: Option<String>,
        /// Variable as name=value; the value is read as JSON, else as a string
        #[arg(short, long = "var")]
        vars: Vec<String>,
    },

    /// Rewrite regex conditions of SELECT statements into comparisons
    Rewrite {
        query: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::load_with_env(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    if let Err(e) = run(cli, &config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("influxql={}", config.level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    let json = match cli.format.as_str() {
        "json" => true,
        "table" => false,
        other => bail!("unknown output format: {} (expected table or json)", other),
    };

    let mut params = config.query.params.clone();
    for param in &cli.params {
        let (name, value) = split_assignment(param)?;
        params.insert(name.to_string(), value);
    }

    match cli.command {
        Commands::Parse { query } => {
            let query = parse_query(&query, &params)?;
            if json {
                let statements: Vec<String> =
                    query.statements.iter().map(|s| s.to_string()).collect();
                println!("{}", serde_json::to_string_pretty(&statements)?);
            } else {
                for stmt in &query.statements {
                    println!("{}", stmt);
                }
            }
        }

        Commands::Privileges { query } => {
            let query = parse_query(&query, &params)?;
            if json {
                let out: Vec<JsonValue> = query
                    .statements
                    .iter()
                    .map(|s| {
                        json!({
                            "statement": s.to_string(),
                            "privileges": s.required_privileges(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for stmt in &query.statements {
                    println!("{}", stmt);
                    println!("  {:<8} {:<20} {}", "Admin", "Database", "Privilege");
                    println!("  {}", "-".repeat(40));
                    for p in stmt.required_privileges() {
                        let privilege = serde_json::to_value(p.privilege)?;
                        println!(
                            "  {:<8} {:<20} {}",
                            p.admin,
                            p.name,
                            privilege.as_str().unwrap_or_default()
                        );
                    }
                }
            }
        }

        Commands::Reduce { expr, now } => {
            let expr = parse_expr(&expr, &params)?;
            let valuer = now_valuer(now.as_deref(), config)?;
            let reduced = reduce(expr, Some(&valuer));
            if json {
                println!("{}", json!({ "expr": reduced.to_string() }));
            } else {
                println!("{}", reduced);
            }
        }

        Commands::Condition { expr, now } => {
            let expr = parse_expr(&expr, &params)?;
            let valuer = now_valuer(now.as_deref(), config)?;
            let (cond, range) = condition_expr(&expr, Some(&valuer))?;
            let cond = cond.map(|c| c.to_string());
            if json {
                let out = json!({
                    "min": range.min.map(|t| t.to_rfc3339()),
                    "max": range.max.map(|t| t.to_rfc3339()),
                    "condition": cond,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{:<10} {}", "Range", range);
                println!("{:<10} {}", "Condition", cond.as_deref().unwrap_or("<none>"));
            }
        }

        Commands::Eval { expr, now, vars } => {
            let expr = parse_expr(&expr, &params)?;
            let now = now_valuer(now.as_deref(), config)?;

            let mut values = HashMap::new();
            for var in &vars {
                let (name, value) = split_assignment(var)?;
                values.insert(name.to_string(), json_to_value(value));
            }
            let vars = MapValuer(values);
            let valuers: Vec<&dyn Valuer> = vec![&now, &vars];
            let valuer = MultiValuer::new(valuers);

            let value = ValuerEval::new(&valuer)
                .with_integer_float_division(config.query.integer_float_division)
                .eval(&expr);
            if json {
                println!("{}", json!({ "value": value.to_string(), "type": value.data_type().to_string() }));
            } else {
                println!("{}", value);
            }
        }

        Commands::Rewrite { query } => {
            let query = parse_query(&query, &params)?;
            let mut out = Vec::new();
            for stmt in query.statements {
                let stmt = match stmt {
                    Statement::Select(mut select) => {
                        select.rewrite_regex_conditions();
                        Statement::Select(select)
                    }
                    other => other,
                };
                out.push(stmt.to_string());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for stmt in out {
                    println!("{}", stmt);
                }
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("failed to write {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn parse_query(query: &str, params: &Map<String, JsonValue>) -> anyhow::Result<Query> {
    let mut parser = Parser::new(query);
    parser.set_params(params);
    Ok(parser.parse_query()?)
}

fn parse_expr(expr: &str, params: &Map<String, JsonValue>) -> anyhow::Result<Expr> {
    let mut parser = Parser::new(expr);
    parser.set_params(params);
    Ok(parser.parse_expr()?)
}

fn now_valuer(now: Option<&str>, config: &Config) -> anyhow::Result<NowValuer> {
    let now = match now {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --now value {:?}", s))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let mut valuer = NowValuer::new(now);
    match config.timezone() {
        Some(tz) => valuer = valuer.with_location(tz),
        None => tracing::warn!("unknown time zone {:?} in config, using UTC", config.query.timezone),
    }
    Ok(valuer)
}

/// `name=value`, with the value read as JSON and falling back to a string
fn split_assignment(s: &str) -> anyhow::Result<(&str, JsonValue)> {
    let Some((name, raw)) = s.split_once('=') else {
        bail!("expected name=value, got {:?}", s);
    };
    let value = serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()));
    Ok((name, value))
}

fn json_to_value(value: JsonValue) -> Value {
    match value {
        JsonValue::Bool(b) => Value::Boolean(b),
        JsonValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Integer(v)
            } else if let Some(v) = n.as_u64() {
                Value::Unsigned(v)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => Value::String(s),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => Value::Null,
    }
}
