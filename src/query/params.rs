//! Bound parameters
//!
//! A query can contain `$name` placeholders. Before parsing, the caller
//! supplies a JSON object mapping names to values; each value is bound to the
//! token the scanner would have produced had the value been typed inline.
//!
//! ```text
//! "west"                  -> STRING 'west'
//! 1.5                     -> NUMBER
//! 10                      -> INTEGER
//! true                    -> TRUE
//! {"ident": "cpu"}        -> IDENT
//! {"regex": "^c"}         -> REGEX
//! {"duration": "10s"}     -> DURATIONVAL
//! ```
//!
//! A value that cannot be bound does not fail immediately. It becomes
//! [`BoundValue::Error`] and the message is only reported if the query
//! actually references the parameter.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use super::duration::format_duration;
use super::token::Token;

/// Bound parameters by name, without the leading `$`
pub type Params = HashMap<String, BoundValue>;

/// A parameter value ready to be substituted for a `$name` token
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Identifier(String),
    String(String),
    Regex(String),
    Number(f64),
    Integer(i64),
    /// An integer too large for `i64`
    Unsigned(u64),
    Boolean(bool),
    Duration(String),
    /// A value that failed to bind; the message is reported on use
    Error(String),
}

impl BoundValue {
    /// Bind a JSON value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::String(s.clone()),
            Value::Number(n) => bind_number(n),
            Value::Bool(b) => Self::Boolean(*b),
            Value::Object(m) => bind_object(m),
            Value::Null => unbindable("null"),
            Value::Array(_) => unbindable("array"),
        }
    }

    /// Token the value stands in for
    pub fn token(&self) -> Token {
        match self {
            Self::Identifier(_) => Token::Ident,
            Self::String(_) => Token::String,
            Self::Regex(_) => Token::Regex,
            Self::Number(_) => Token::Number,
            Self::Integer(_) | Self::Unsigned(_) => Token::Integer,
            Self::Boolean(true) => Token::True,
            Self::Boolean(false) => Token::False,
            Self::Duration(_) => Token::DurationVal,
            Self::Error(_) => Token::BoundParam,
        }
    }

    /// Literal text of the substituted token
    pub fn literal(&self) -> String {
        match self {
            Self::Identifier(s) | Self::String(s) | Self::Regex(s) | Self::Duration(s) => s.clone(),
            Self::Number(v) => format!("{}", v),
            Self::Integer(v) => v.to_string(),
            Self::Unsigned(v) => v.to_string(),
            Self::Boolean(v) => v.to_string(),
            Self::Error(msg) => msg.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Bind every entry of a JSON object
pub fn bind_params(params: &Map<String, Value>) -> Params {
    params
        .iter()
        .map(|(k, v)| (k.clone(), BoundValue::from_json(v)))
        .collect()
}

fn unbindable(kind: &str) -> BoundValue {
    BoundValue::Error(format!("unable to bind parameter with type {}", kind))
}

fn bind_number(n: &Number) -> BoundValue {
    if let Some(v) = n.as_i64() {
        BoundValue::Integer(v)
    } else if let Some(v) = n.as_u64() {
        BoundValue::Unsigned(v)
    } else {
        BoundValue::Number(n.as_f64().unwrap_or_default())
    }
}

/// `{"kind": value}` objects name the token type explicitly
fn bind_object(m: &Map<String, Value>) -> BoundValue {
    let mut entries = m.iter();
    let (kind, value) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return BoundValue::Error(
                "bound object parameter value must have exactly one entry".to_string(),
            )
        }
    };

    match kind.as_str() {
        "ident" | "identifier" => match value {
            Value::String(s) => BoundValue::Identifier(s.clone()),
            _ => BoundValue::Error("identifier must be a string value".to_string()),
        },
        "regex" => match value {
            Value::String(s) => BoundValue::Regex(s.clone()),
            _ => BoundValue::Error("regex literal must be a string value".to_string()),
        },
        "string" => match value {
            Value::String(s) => BoundValue::String(s.clone()),
            _ => BoundValue::Error("string literal must be a string value".to_string()),
        },
        "float" | "number" => match value {
            Value::Number(n) => BoundValue::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => match s.parse::<f64>() {
                Ok(v) => BoundValue::Number(v),
                Err(_) => BoundValue::Error("number literal must be a float value".to_string()),
            },
            _ => BoundValue::Error("number literal must be a float value".to_string()),
        },
        "int" | "integer" => match value {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(v), _) => BoundValue::Integer(v),
                (None, Some(v)) if v.fract() == 0.0 => BoundValue::Integer(v as i64),
                _ => BoundValue::Error("integer literal must be an integer value".to_string()),
            },
            Value::String(s) => match s.parse::<i64>() {
                Ok(v) => BoundValue::Integer(v),
                Err(_) => BoundValue::Error("integer literal must be an integer value".to_string()),
            },
            _ => BoundValue::Error("integer literal must be an integer value".to_string()),
        },
        "duration" => match value {
            Value::String(s) => BoundValue::Duration(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(v) => BoundValue::Duration(format_duration(v)),
                None => BoundValue::Error("duration literal must be an integer value".to_string()),
            },
            _ => BoundValue::Error("duration literal must be a string or integer value".to_string()),
        },
        other => BoundValue::Error(format!("unknown bind object type: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bind(v: Value) -> BoundValue {
        BoundValue::from_json(&v)
    }

    #[test]
    fn test_plain_values() {
        assert_eq!(bind(json!("west")), BoundValue::String("west".to_string()));
        assert_eq!(bind(json!(10)), BoundValue::Integer(10));
        assert_eq!(bind(json!(1.5)), BoundValue::Number(1.5));
        assert_eq!(bind(json!(u64::MAX)), BoundValue::Unsigned(u64::MAX));
        assert_eq!(bind(json!(true)).token(), Token::True);
        assert_eq!(bind(json!(false)).token(), Token::False);
    }

    #[test]
    fn test_object_values() {
        assert_eq!(bind(json!({"ident": "cpu"})), BoundValue::Identifier("cpu".to_string()));
        assert_eq!(bind(json!({"regex": "^c"})).token(), Token::Regex);
        assert_eq!(bind(json!({"float": 2})), BoundValue::Number(2.0));
        assert_eq!(bind(json!({"integer": "42"})), BoundValue::Integer(42));
        assert_eq!(bind(json!({"duration": "10s"})), BoundValue::Duration("10s".to_string()));
        assert_eq!(
            bind(json!({"duration": 3_600_000_000_000i64})),
            BoundValue::Duration("1h".to_string())
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(BoundValue::Number(2.0).literal(), "2");
        assert_eq!(BoundValue::Number(-0.25).literal(), "-0.25");
        assert_eq!(BoundValue::Integer(-3).literal(), "-3");
        assert_eq!(BoundValue::Boolean(true).literal(), "true");
    }

    #[test]
    fn test_bind_errors() {
        let cases = [
            (json!({"ident": "a", "string": "b"}), "bound object parameter value must have exactly one entry"),
            (json!({}), "bound object parameter value must have exactly one entry"),
            (json!({"ident": 1}), "identifier must be a string value"),
            (json!({"regex": 1}), "regex literal must be a string value"),
            (json!({"string": false}), "string literal must be a string value"),
            (json!({"number": "abc"}), "number literal must be a float value"),
            (json!({"int": 1.5}), "integer literal must be an integer value"),
            (json!({"color": "red"}), "unknown bind object type: color"),
            (json!(null), "unable to bind parameter with type null"),
            (json!([1, 2]), "unable to bind parameter with type array"),
        ];
        for (value, msg) in cases {
            let bound = bind(value);
            assert!(bound.is_error());
            assert_eq!(bound.token(), Token::BoundParam);
            assert_eq!(bound.literal(), msg);
        }
    }

    #[test]
    fn test_bind_params() {
        let params = json!({"host": "a", "limit": 5});
        let bound = bind_params(params.as_object().unwrap());
        assert_eq!(bound.len(), 2);
        assert_eq!(bound["limit"], BoundValue::Integer(5));
    }
}
