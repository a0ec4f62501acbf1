//! Expression evaluation against runtime values
//!
//! A [`Valuer`] supplies values for names and, optionally, results for
//! function calls and a time zone. [`ValuerEval`] walks an expression and
//! combines the values it finds.
//!
//! Values of mismatched kinds never fail: comparisons between them are
//! `false` and arithmetic is [`Value::Null`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::data_type::DataType;
use super::duration::format_duration;
use super::expr::{format_number, BinaryExpr, Expr, RegexLiteral};
use super::timestamp::{format_rfc3339_nano, time_from_nanos};
use super::token::Token;

/// A runtime value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    String(String),
    Boolean(bool),
    Time(DateTime<Utc>),
    /// Nanoseconds
    Duration(i64),
    Regex(RegexLiteral),
}

impl Value {
    /// Zero value of a data type, `Null` for types without one
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Float => Self::Float(0.0),
            DataType::Integer => Self::Integer(0),
            DataType::Unsigned => Self::Unsigned(0),
            DataType::String | DataType::Tag => Self::String(String::new()),
            DataType::Boolean => Self::Boolean(false),
            DataType::Time => Self::Time(time_from_nanos(0)),
            DataType::Duration => Self::Duration(0),
            DataType::AnyField | DataType::Unknown => Self::Null,
        }
    }

    /// Data type of the value
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Integer(_) => DataType::Integer,
            Self::Unsigned(_) => DataType::Unsigned,
            Self::String(_) => DataType::String,
            Self::Boolean(_) => DataType::Boolean,
            Self::Time(_) => DataType::Time,
            Self::Duration(_) => DataType::Duration,
            Self::Null | Self::Regex(_) => DataType::Unknown,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert back into a literal expression
    pub fn into_literal(self) -> Expr {
        match self {
            Self::Boolean(v) => Expr::Boolean(v),
            Self::Duration(v) => Expr::Duration(v),
            Self::Float(v) => Expr::Number(v),
            Self::Integer(v) => Expr::Integer(v),
            Self::Unsigned(v) => Expr::Unsigned(v),
            Self::String(v) => Expr::String(v),
            Self::Time(v) => Expr::Time(v),
            Self::Regex(v) => Expr::Regex(v),
            Self::Null => Expr::Nil,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Unsigned(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Float(v) => f.write_str(&format_number(*v)),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Time(v) => f.write_str(&format_rfc3339_nano(v)),
            Self::Duration(v) => f.write_str(&format_duration(*v)),
            Self::Regex(v) => write!(f, "{}", v),
        }
    }
}

/// Source of values for names, function calls and the time zone
pub trait Valuer {
    /// Value for `key`, or `None` when the valuer does not know it
    fn value(&self, key: &str) -> Option<Value>;

    /// Result of calling `name` with `args`, or `None` when not supported
    fn call(&self, _name: &str, _args: &[Value]) -> Option<Value> {
        None
    }

    /// Zone used to interpret date strings
    fn zone(&self) -> Option<Tz> {
        None
    }
}

impl<V: Valuer + ?Sized> Valuer for &V {
    fn value(&self, key: &str) -> Option<Value> {
        (**self).value(key)
    }

    fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        (**self).call(name, args)
    }

    fn zone(&self) -> Option<Tz> {
        (**self).zone()
    }
}

/// Values from a map
#[derive(Debug, Clone, Default)]
pub struct MapValuer(pub HashMap<String, Value>);

impl MapValuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }
}

impl Valuer for MapValuer {
    fn value(&self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }
}

/// Resolves `now()` to a fixed instant
#[derive(Debug, Clone)]
pub struct NowValuer {
    pub now: DateTime<Utc>,
    pub location: Option<Tz>,
}

impl NowValuer {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now, location: None }
    }

    pub fn with_location(mut self, location: Tz) -> Self {
        self.location = Some(location);
        self
    }
}

impl Valuer for NowValuer {
    fn value(&self, key: &str) -> Option<Value> {
        (key == "now()").then(|| Value::Time(self.now))
    }

    fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        (name == "now" && args.is_empty()).then(|| Value::Time(self.now))
    }

    fn zone(&self) -> Option<Tz> {
        self.location
    }
}

/// Asks each valuer in turn; the first answer wins.
#[derive(Default)]
pub struct MultiValuer<'a>(pub Vec<&'a dyn Valuer>);

impl<'a> MultiValuer<'a> {
    pub fn new(valuers: Vec<&'a dyn Valuer>) -> Self {
        Self(valuers)
    }
}

impl Valuer for MultiValuer<'_> {
    fn value(&self, key: &str) -> Option<Value> {
        self.0.iter().find_map(|v| v.value(key))
    }

    fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        self.0.iter().find_map(|v| v.call(name, args))
    }

    fn zone(&self) -> Option<Tz> {
        self.0.iter().find_map(|v| v.zone())
    }
}

/// Evaluates expressions with a valuer
pub struct ValuerEval<'a> {
    pub valuer: &'a dyn Valuer,
    /// Divide two integers as floats
    pub integer_float_division: bool,
}

impl<'a> ValuerEval<'a> {
    pub fn new(valuer: &'a dyn Valuer) -> Self {
        Self {
            valuer,
            integer_float_division: false,
        }
    }

    pub fn with_integer_float_division(mut self, enabled: bool) -> Self {
        self.integer_float_division = enabled;
        self
    }

    /// Evaluate `expr` to a value
    pub fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Binary(b) => self.eval_binary(b),
            Expr::Paren(inner) => self.eval(inner),
            Expr::Boolean(v) => Value::Boolean(*v),
            Expr::Integer(v) => Value::Integer(*v),
            Expr::Unsigned(v) => Value::Unsigned(*v),
            Expr::Number(v) => Value::Float(*v),
            Expr::String(v) => Value::String(v.clone()),
            Expr::Regex(v) => Value::Regex(v.clone()),
            Expr::Duration(v) => Value::Duration(*v),
            Expr::Time(v) => Value::Time(*v),
            Expr::Call(c) => {
                let args: Vec<Value> = c.args.iter().map(|a| self.eval(a)).collect();
                self.valuer.call(&c.name, &args).unwrap_or_default()
            }
            Expr::VarRef(r) => self.valuer.value(&r.val).unwrap_or_default(),
            _ => Value::Null,
        }
    }

    /// Whether `expr` evaluates to boolean true
    pub fn eval_bool(&self, expr: &Expr) -> bool {
        matches!(self.eval(expr), Value::Boolean(true))
    }

    fn eval_binary(&self, expr: &BinaryExpr) -> Value {
        let mut lhs = self.eval(&expr.lhs);
        let mut rhs = self.eval(&expr.rhs);

        // nil beside a boolean reads as false
        match (&lhs, &rhs) {
            (Value::Null, Value::Boolean(_)) => lhs = Value::Boolean(false),
            (Value::Boolean(_), Value::Null) => rhs = Value::Boolean(false),
            _ => {}
        }

        let op = expr.op;
        let out = match (&lhs, &rhs) {
            (Value::Boolean(l), r) => {
                let r = match r {
                    Value::Boolean(r) => Some(*r),
                    _ => None,
                };
                eval_bool_op(op, *l, r)
            }
            (Value::Float(l), r) => r.as_f64().and_then(|r| eval_float_op(op, *l, r)),
            (Value::Integer(l), Value::Float(r)) => eval_float_op(op, *l as f64, *r),
            (Value::Integer(l), Value::Integer(r)) => {
                eval_integer_op(op, *l, *r, self.integer_float_division)
            }
            (Value::Integer(l), Value::Unsigned(r)) => {
                if *l < 0 {
                    match op {
                        Token::Lt | Token::Lte => return Value::Boolean(true),
                        Token::Gt | Token::Gte => return Value::Boolean(false),
                        _ => {}
                    }
                }
                eval_unsigned_op(op, *l as u64, *r)
            }
            (Value::Unsigned(l), Value::Float(r)) => eval_float_op(op, *l as f64, *r),
            (Value::Unsigned(l), Value::Integer(r)) => {
                if *r < 0 {
                    match op {
                        Token::Lt | Token::Lte => return Value::Boolean(false),
                        Token::Gt | Token::Gte => return Value::Boolean(true),
                        _ => {}
                    }
                }
                eval_unsigned_op(op, *l, *r as u64)
            }
            (Value::Unsigned(l), Value::Unsigned(r)) => eval_unsigned_op(op, *l, *r),
            (Value::String(l), r) => eval_string_op(op, l, r),
            (Value::Time(l), Value::Time(r)) => compare(op, l, r),
            (Value::Duration(l), Value::Duration(r)) => compare(op, l, r),
            _ => None,
        };

        out.unwrap_or_else(|| {
            if is_comparison(op) {
                Value::Boolean(false)
            } else {
                Value::Null
            }
        })
    }
}

fn is_comparison(op: Token) -> bool {
    matches!(
        op,
        Token::Eq | Token::Neq | Token::Lt | Token::Lte | Token::Gt | Token::Gte
    )
}

fn compare<T: PartialOrd>(op: Token, l: &T, r: &T) -> Option<Value> {
    let v = match op {
        Token::Eq => l == r,
        Token::Neq => l != r,
        Token::Lt => l < r,
        Token::Lte => l <= r,
        Token::Gt => l > r,
        Token::Gte => l >= r,
        _ => return None,
    };
    Some(Value::Boolean(v))
}

fn eval_bool_op(op: Token, l: bool, r: Option<bool>) -> Option<Value> {
    let v = match op {
        Token::And | Token::BitwiseAnd => r.map_or(false, |r| l && r),
        Token::Or | Token::BitwiseOr => r.map_or(false, |r| l || r),
        Token::BitwiseXor => r.map_or(false, |r| l != r),
        Token::Eq => r.map_or(false, |r| l == r),
        Token::Neq => r.map_or(false, |r| l != r),
        _ => return None,
    };
    Some(Value::Boolean(v))
}

fn eval_float_op(op: Token, l: f64, r: f64) -> Option<Value> {
    let v = match op {
        Token::Add => l + r,
        Token::Sub => l - r,
        Token::Mul => l * r,
        Token::Div if r == 0.0 => 0.0,
        Token::Div => l / r,
        Token::Mod => l % r,
        _ => return compare(op, &l, &r),
    };
    Some(Value::Float(v))
}

fn eval_integer_op(op: Token, l: i64, r: i64, float_division: bool) -> Option<Value> {
    let v = match op {
        Token::Add => l.wrapping_add(r),
        Token::Sub => l.wrapping_sub(r),
        Token::Mul => l.wrapping_mul(r),
        Token::Div if float_division => {
            let v = if r == 0 { 0.0 } else { l as f64 / r as f64 };
            return Some(Value::Float(v));
        }
        Token::Div if r == 0 => 0,
        Token::Div => l.wrapping_div(r),
        Token::Mod if r == 0 => 0,
        Token::Mod => l.wrapping_rem(r),
        Token::BitwiseAnd => l & r,
        Token::BitwiseOr => l | r,
        Token::BitwiseXor => l ^ r,
        _ => return compare(op, &l, &r),
    };
    Some(Value::Integer(v))
}

fn eval_unsigned_op(op: Token, l: u64, r: u64) -> Option<Value> {
    let v = match op {
        Token::Add => l.wrapping_add(r),
        Token::Sub => l.wrapping_sub(r),
        Token::Mul => l.wrapping_mul(r),
        Token::Div if r == 0 => 0,
        Token::Div => l / r,
        Token::Mod if r == 0 => 0,
        Token::Mod => l % r,
        Token::BitwiseAnd => l & r,
        Token::BitwiseOr => l | r,
        Token::BitwiseXor => l ^ r,
        _ => return compare(op, &l, &r),
    };
    Some(Value::Unsigned(v))
}

fn eval_string_op(op: Token, l: &str, r: &Value) -> Option<Value> {
    let v = match (op, r) {
        (Token::Eq, Value::String(r)) => l == r,
        (Token::Neq, Value::String(r)) => l != r,
        (Token::EqRegex, Value::Regex(re)) => re.is_match(l),
        (Token::NeqRegex, Value::Regex(re)) => !re.is_match(l),
        (Token::Eq | Token::Neq | Token::EqRegex | Token::NeqRegex, _) => false,
        _ => return None,
    };
    Some(Value::Boolean(v))
}

/// Evaluate `expr` with values from a map.
pub fn eval(expr: &Expr, values: &HashMap<String, Value>) -> Value {
    let valuer = MapValuer(values.clone());
    ValuerEval::new(&valuer).eval(expr)
}

/// Whether `expr` evaluates to boolean true with values from a map
pub fn eval_bool(expr: &Expr, values: &HashMap<String, Value>) -> bool {
    matches!(eval(expr, values), Value::Boolean(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_expr;

    fn values() -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("f".to_string(), Value::Float(1.5));
        m.insert("i".to_string(), Value::Integer(7));
        m.insert("u".to_string(), Value::Unsigned(3));
        m.insert("s".to_string(), Value::String("west".to_string()));
        m.insert("b".to_string(), Value::Boolean(true));
        m
    }

    fn eval_str(s: &str) -> Value {
        eval(&parse_expr(s).unwrap(), &values())
    }

    #[test]
    fn test_numeric_arithmetic() {
        assert_eq!(eval_str("i + 1"), Value::Integer(8));
        assert_eq!(eval_str("i * f"), Value::Float(10.5));
        assert_eq!(eval_str("i / 2"), Value::Integer(3));
        assert_eq!(eval_str("i % 0"), Value::Integer(0));
        assert_eq!(eval_str("f / 0"), Value::Float(0.0));
        assert_eq!(eval_str("u + 2"), Value::Unsigned(5));
        assert_eq!(eval_str("i & 3"), Value::Integer(3));
    }

    #[test]
    fn test_integer_float_division() {
        let valuer = MapValuer(values());
        let expr = parse_expr("i / 2").unwrap();
        let eval = ValuerEval::new(&valuer).with_integer_float_division(true);
        assert_eq!(eval.eval(&expr), Value::Float(3.5));

        let expr = parse_expr("i / 0").unwrap();
        assert_eq!(eval.eval(&expr), Value::Float(0.0));
    }

    #[test]
    fn test_comparisons() {
        assert!(eval_bool(&parse_expr("i > 5 AND f < 2").unwrap(), &values()));
        assert!(eval_bool(&parse_expr("s = 'west'").unwrap(), &values()));
        assert!(eval_bool(&parse_expr("s =~ /^w/").unwrap(), &values()));
        assert!(!eval_bool(&parse_expr("s !~ /^w/").unwrap(), &values()));
        assert!(eval_bool(&parse_expr("u > -1").unwrap(), &values()));
        assert!(eval_bool(&parse_expr("-1 < u").unwrap(), &values()));
    }

    #[test]
    fn test_mismatched_types() {
        assert_eq!(eval_str("s = 1"), Value::Boolean(false));
        assert_eq!(eval_str("s + 1"), Value::Null);
        assert_eq!(eval_str("missing > 1"), Value::Boolean(false));
        assert_eq!(eval_str("missing + 1"), Value::Null);
    }

    #[test]
    fn test_nil_beside_boolean_is_false() {
        assert_eq!(eval_str("missing OR b"), Value::Boolean(true));
        assert_eq!(eval_str("b AND missing"), Value::Boolean(false));
    }

    #[test]
    fn test_now_valuer() {
        let now = time_from_nanos(1_000_000_000);
        let valuer = NowValuer::new(now);
        let eval = ValuerEval::new(&valuer);
        assert_eq!(eval.eval(&parse_expr("now()").unwrap()), Value::Time(now));
        assert_eq!(eval.eval(&parse_expr("later()").unwrap()), Value::Null);
        assert!(valuer.zone().is_none());
        assert_eq!(
            NowValuer::new(now).with_location(Tz::Europe__Paris).zone(),
            Some(Tz::Europe__Paris)
        );
    }

    #[test]
    fn test_multi_valuer_first_match_wins() {
        let mut a = MapValuer::new();
        a.insert("x", Value::Integer(1));
        let mut b = MapValuer::new();
        b.insert("x", Value::Integer(2)).insert("y", Value::Integer(3));
        let now = NowValuer::new(time_from_nanos(0)).with_location(Tz::Asia__Tokyo);

        let multi = MultiValuer::new(vec![&a, &b, &now]);
        assert_eq!(multi.value("x"), Some(Value::Integer(1)));
        assert_eq!(multi.value("y"), Some(Value::Integer(3)));
        assert_eq!(multi.value("z"), None);
        assert_eq!(multi.call("now", &[]), Some(Value::Time(time_from_nanos(0))));
        assert_eq!(multi.zone(), Some(Tz::Asia__Tokyo));
    }

    #[test]
    fn test_zero_values_report_their_type() {
        for dt in [
            DataType::Float,
            DataType::Integer,
            DataType::Unsigned,
            DataType::String,
            DataType::Boolean,
            DataType::Time,
            DataType::Duration,
        ] {
            assert_eq!(Value::zero(dt).data_type(), dt);
        }
        assert_eq!(Value::zero(DataType::Tag).data_type(), DataType::String);
        assert!(Value::zero(DataType::Unknown).is_null());
    }
}
