//! Query error types
//!
//! Parse failures carry the position of the offending token. Type failures
//! carry the expression they were raised for. Everything else a query pass can
//! fail with is a [`QueryError`].

use std::fmt;

use thiserror::Error;

use super::expr::Expr;
use super::scanner::Pos;

/// A syntax error, or a named validation failure found while parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub found: String,
    pub expected: Vec<String>,
    /// Unset for clause-level validation failures
    pub pos: Option<Pos>,
}

impl ParseError {
    /// Error for an unexpected token
    pub fn new(found: impl Into<String>, expected: &[&str], pos: Pos) -> Self {
        Self {
            message: String::new(),
            found: found.into(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
            pos: Some(pos),
        }
    }

    /// Error with a free-form message
    pub fn message(message: impl Into<String>, pos: Pos) -> Self {
        Self {
            message: message.into(),
            found: String::new(),
            expected: Vec::new(),
            pos: Some(pos),
        }
    }

    /// Error that is not tied to a single token, such as an invalid `fill()`
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            found: String::new(),
            expected: Vec::new(),
            pos: None,
        }
    }

    pub(crate) fn with_expected(found: impl Into<String>, expected: Vec<String>, pos: Pos) -> Self {
        Self {
            message: String::new(),
            found: found.into(),
            expected,
            pos: Some(pos),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "found {}, expected {}", self.found, self.expected.join(", "))?;
        } else {
            f.write_str(&self.message)?;
        }
        match self.pos {
            Some(pos) => write!(f, " at {}", pos),
            None => Ok(()),
        }
    }
}

impl std::error::Error for ParseError {}

/// A type incompatibility found while evaluating expression types
#[derive(Debug, Clone, PartialEq)]
pub struct TypeError {
    pub expr: Expr,
    pub message: String,
}

impl TypeError {
    pub fn new(expr: Expr, message: impl Into<String>) -> Self {
        Self {
            expr,
            message: message.into(),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type error: {}: {}", self.expr, self.message)
    }
}

impl std::error::Error for TypeError {}

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query parsing failed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Expression types are incompatible
    #[error(transparent)]
    Type(#[from] TypeError),

    /// A string could not be interpreted as a timestamp
    #[error("invalid timestamp string")]
    InvalidTime,

    /// A WHERE clause could not be split into a time range and a condition
    #[error("{0}")]
    Condition(String),

    /// Malformed GROUP BY time() dimension
    #[error("{0}")]
    Dimension(String),

    /// Wildcard or regex expansion failed
    #[error("{0}")]
    Rewrite(String),

    /// A time zone name was not recognised
    #[error("unable to find time zone {0}")]
    UnknownTimeZone(String),

    /// A caller-supplied mapper failed
    #[error(transparent)]
    Mapper(#[from] anyhow::Error),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
