//! Data sources of a query
//!
//! A source is either a measurement (possibly qualified by database and
//! retention policy, or matched by regex) or a nested SELECT.

use std::fmt;

use super::ast::{ExecutionPrivilege, Privilege};
use super::expr::{join_display, RegexLiteral};
use super::quote::quote_ident;
use super::select::SelectStatement;

/// A measurement reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub database: String,
    pub retention_policy: String,
    pub name: String,
    pub regex: Option<RegexLiteral>,
    /// Set when the measurement is the destination of `SELECT ... INTO`
    pub is_target: bool,
    /// Internal iterator name such as `_series`, rendered in place of the name
    pub system_iterator: String,
}

impl Measurement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = rp.into();
        self
    }

    pub fn regex(re: RegexLiteral) -> Self {
        Self {
            regex: Some(re),
            ..Default::default()
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.database.is_empty() {
            write!(f, "{}.", quote_ident(&[&self.database]))?;
        }
        if !self.retention_policy.is_empty() {
            f.write_str(&quote_ident(&[&self.retention_policy]))?;
        }
        if !self.database.is_empty() || !self.retention_policy.is_empty() {
            f.write_str(".")?;
        }

        if !self.system_iterator.is_empty() {
            f.write_str(&quote_ident(&[&self.system_iterator]))
        } else if !self.name.is_empty() {
            f.write_str(&quote_ident(&[&self.name]))
        } else if let Some(re) = &self.regex {
            write!(f, "{}", re)
        } else {
            Ok(())
        }
    }
}

/// A FROM clause entry
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Measurement(Measurement),
    SubQuery(Box<SelectStatement>),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measurement(m) => write!(f, "{}", m),
            Self::SubQuery(s) => write!(f, "({})", s),
        }
    }
}

/// Render a source list separated by commas
pub fn sources_string(sources: &[Source]) -> String {
    join_display(sources, ", ")
}

/// All measurements, including those inside subqueries
pub fn measurements(sources: &[Source]) -> Vec<&Measurement> {
    let mut out = Vec::with_capacity(sources.len());
    for src in sources {
        match src {
            Source::Measurement(m) => out.push(m),
            Source::SubQuery(s) => out.extend(measurements(&s.sources)),
        }
    }
    out
}

/// Read access to every measurement's database, recursing into subqueries
pub fn sources_privileges(sources: &[Source]) -> Vec<ExecutionPrivilege> {
    let mut out = Vec::new();
    for src in sources {
        match src {
            Source::Measurement(m) => out.push(ExecutionPrivilege::new(&m.database, Privilege::Read)),
            Source::SubQuery(s) => out.extend(s.required_privileges()),
        }
    }
    out
}

/// Whether a measurement name is reserved for internal iterators
pub fn is_system_name(name: &str) -> bool {
    matches!(
        name,
        "_fieldKeys" | "_measurements" | "_name" | "_series" | "_tagKey" | "_tagKeys" | "_tags"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_statement;
    use crate::query::ast::Statement;

    #[test]
    fn test_measurement_display() {
        assert_eq!(Measurement::new("cpu").to_string(), "cpu");
        assert_eq!(
            Measurement::new("cpu").with_database("db").with_retention_policy("rp").to_string(),
            "db.rp.cpu"
        );
        assert_eq!(Measurement::new("cpu").with_database("db").to_string(), "db..cpu");
        assert_eq!(Measurement::new("cpu").with_retention_policy("rp").to_string(), "rp.cpu");

        let re = RegexLiteral::new("^cpu").unwrap();
        assert_eq!(Measurement::regex(re).to_string(), "/^cpu/");

        let mut m = Measurement::new("cpu");
        m.system_iterator = "_series".into();
        assert_eq!(m.to_string(), "_series");
    }

    #[test]
    fn test_measurements_recurse_into_subqueries() {
        let stmt = parse_statement("SELECT max(v) FROM mem, (SELECT v FROM db0..cpu, disk)").unwrap();
        let Statement::Select(stmt) = stmt else {
            panic!("expected select");
        };
        let names: Vec<&str> = measurements(&stmt.sources).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["mem", "cpu", "disk"]);
    }

    #[test]
    fn test_is_system_name() {
        assert!(is_system_name("_series"));
        assert!(is_system_name("_fieldKeys"));
        assert!(!is_system_name("cpu"));
        assert!(!is_system_name("_other"));
    }
}
