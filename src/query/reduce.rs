//! Constant folding
//!
//! [`reduce`] evaluates every part of an expression that only depends on
//! literals, or on names and calls the valuer can resolve, and leaves the rest
//! of the tree in place. Strings that look like dates are treated as time
//! literals wherever they meet a time, a duration or an integer.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use super::eval::{MapValuer, Valuer, ValuerEval};
use super::expr::{BinaryExpr, Call, Dimension, Expr};
use super::select::SelectStatement;
use super::source::Source;
use super::timestamp::{is_time_string, parse_time_string, time_from_nanos};
use super::token::Token;

/// Fold `expr` using the values in `valuer`. Names the valuer does not know
/// are left as references. A parenthesized result is unwrapped.
pub fn reduce(expr: Expr, valuer: Option<&dyn Valuer>) -> Expr {
    match reduce_expr(expr, valuer) {
        Expr::Paren(inner) => *inner,
        other => other,
    }
}

/// Like [`reduce`] but keeps a parenthesized result.
pub(crate) fn reduce_expr(expr: Expr, valuer: Option<&dyn Valuer>) -> Expr {
    match expr {
        Expr::Binary(b) => reduce_binary(*b, valuer),
        Expr::Call(c) => reduce_call(c, valuer),
        Expr::Paren(inner) => match reduce_expr(*inner, valuer) {
            sub @ Expr::Binary(_) => Expr::paren(sub),
            sub => sub,
        },
        Expr::VarRef(r) => match valuer.and_then(|v| v.value(&r.val)) {
            Some(value) => value.into_literal(),
            None => Expr::VarRef(r),
        },
        other => other,
    }
}

fn reduce_binary(expr: BinaryExpr, valuer: Option<&dyn Valuer>) -> Expr {
    let BinaryExpr { op, lhs, rhs } = expr;

    // Both sides are reduced before AND/OR look for a boolean literal.
    let lhs = reduce_expr(lhs, valuer);
    let rhs = reduce_expr(rhs, valuer);
    let loc = valuer.and_then(|v| v.zone());

    match op {
        Token::And => {
            if lhs.is_false() || rhs.is_false() {
                return Expr::Boolean(false);
            } else if lhs.is_true() {
                return rhs;
            } else if rhs.is_true() {
                return lhs;
            }
        }
        Token::Or => {
            if lhs.is_true() || rhs.is_true() {
                return Expr::Boolean(true);
            } else if lhs.is_false() {
                return rhs;
            } else if rhs.is_false() {
                return lhs;
            }
        }
        _ => {}
    }

    match fold(op, &lhs, &rhs, loc) {
        Some(folded) => folded,
        None => Expr::binary(op, lhs, rhs),
    }
}

fn reduce_call(call: Call, valuer: Option<&dyn Valuer>) -> Expr {
    let args: Vec<Expr> = call.args.into_iter().map(|a| reduce_expr(a, valuer)).collect();

    if let Some(valuer) = valuer {
        if args.iter().all(Expr::is_literal) {
            let empty = MapValuer::new();
            let eval = ValuerEval::new(&empty);
            let values: Vec<_> = args.iter().map(|a| eval.eval(a)).collect();
            if let Some(v) = valuer.call(&call.name, &values) {
                return v.into_literal();
            }
        }
    }
    Expr::Call(Call { name: call.name, args })
}

/// Fold two literals; `None` when the pair cannot be folded.
fn fold(op: Token, lhs: &Expr, rhs: &Expr, loc: Option<Tz>) -> Option<Expr> {
    match lhs {
        Expr::Boolean(l) => fold_boolean(op, *l, rhs),
        Expr::Duration(l) => fold_duration(op, *l, rhs, loc),
        Expr::Integer(l) => fold_integer(op, *l, rhs, loc),
        Expr::Unsigned(l) => fold_unsigned(op, *l, rhs),
        Expr::Nil => matches!(op, Token::Eq | Token::Neq).then_some(Expr::Boolean(false)),
        Expr::Number(l) => fold_number(op, *l, rhs),
        Expr::String(l) => fold_string(op, l, rhs, loc),
        Expr::Time(l) => fold_time(op, l, rhs, loc),
        _ => None,
    }
}

fn compare<T: PartialOrd>(op: Token, l: T, r: T) -> Option<Expr> {
    let v = match op {
        Token::Eq => l == r,
        Token::Neq => l != r,
        Token::Gt => l > r,
        Token::Gte => l >= r,
        Token::Lt => l < r,
        Token::Lte => l <= r,
        _ => return None,
    };
    Some(Expr::Boolean(v))
}

fn to_time(s: &str, loc: Option<Tz>) -> Option<DateTime<Utc>> {
    parse_time_string(s, loc).ok()
}

fn shift(t: &DateTime<Utc>, nanos: i64) -> Option<Expr> {
    t.checked_add_signed(Duration::nanoseconds(nanos)).map(Expr::Time)
}

fn fold_boolean(op: Token, l: bool, rhs: &Expr) -> Option<Expr> {
    let v = match rhs {
        Expr::Boolean(r) => match op {
            Token::Eq => l == *r,
            Token::Neq => l != *r,
            Token::And | Token::BitwiseAnd => l && *r,
            Token::Or | Token::BitwiseOr => l || *r,
            Token::BitwiseXor => l != *r,
            _ => return None,
        },
        Expr::Nil => false,
        _ => return None,
    };
    Some(Expr::Boolean(v))
}

fn fold_duration(op: Token, l: i64, rhs: &Expr, loc: Option<Tz>) -> Option<Expr> {
    match rhs {
        Expr::Duration(r) => match op {
            Token::Add => Some(Expr::Duration(l.wrapping_add(*r))),
            Token::Sub => Some(Expr::Duration(l.wrapping_sub(*r))),
            _ => compare(op, l, *r),
        },
        Expr::Number(r) => fold_duration_scale(op, l, *r as i64),
        Expr::Integer(r) => fold_duration_scale(op, l, *r),
        Expr::Time(r) if op == Token::Add => shift(r, l),
        Expr::String(s) => fold_duration(op, l, &Expr::Time(to_time(s, loc)?), loc),
        Expr::Nil => Some(Expr::Boolean(false)),
        _ => None,
    }
}

fn fold_duration_scale(op: Token, l: i64, r: i64) -> Option<Expr> {
    match op {
        Token::Mul => Some(Expr::Duration(l.wrapping_mul(r))),
        Token::Div if r == 0 => Some(Expr::Duration(0)),
        Token::Div => Some(Expr::Duration(l.wrapping_div(r))),
        _ => None,
    }
}

fn fold_integer(op: Token, l: i64, rhs: &Expr, loc: Option<Tz>) -> Option<Expr> {
    match rhs {
        Expr::Number(_) => fold_number(op, l as f64, rhs),
        Expr::Integer(r) => {
            let r = *r;
            let v = match op {
                Token::Add => l.wrapping_add(r),
                Token::Sub => l.wrapping_sub(r),
                Token::Mul => l.wrapping_mul(r),
                Token::Div if r == 0 => return Some(Expr::Number(0.0)),
                Token::Div => return Some(Expr::Number(l as f64 / r as f64)),
                Token::Mod if r == 0 => 0,
                Token::Mod => l.wrapping_rem(r),
                Token::BitwiseAnd => l & r,
                Token::BitwiseOr => l | r,
                Token::BitwiseXor => l ^ r,
                _ => return compare(op, l, r),
            };
            Some(Expr::Integer(v))
        }
        Expr::Unsigned(_) => {
            // A negative integer is below every unsigned value.
            if l < 0 {
                match op {
                    Token::Lt | Token::Lte => return Some(Expr::Boolean(true)),
                    Token::Gt | Token::Gte => return Some(Expr::Boolean(false)),
                    _ => {}
                }
            }
            fold_unsigned(op, l as u64, rhs)
        }
        Expr::Duration(r) => match op {
            Token::Add => shift(&time_from_nanos(l), *r),
            Token::Sub => shift(&time_from_nanos(l), r.wrapping_neg()),
            _ => None,
        },
        Expr::Time(_) => fold_duration(op, l, rhs, loc),
        Expr::String(s) => fold_duration(op, l, &Expr::Time(to_time(s, loc)?), loc),
        Expr::Nil => Some(Expr::Boolean(false)),
        _ => None,
    }
}

fn fold_unsigned(op: Token, l: u64, rhs: &Expr) -> Option<Expr> {
    match rhs {
        Expr::Number(_) => fold_number(op, l as f64, rhs),
        Expr::Integer(r) => {
            if *r < 0 {
                match op {
                    Token::Lt | Token::Lte => return Some(Expr::Boolean(false)),
                    Token::Gt | Token::Gte => return Some(Expr::Boolean(true)),
                    _ => {}
                }
            }
            fold_unsigned(op, l, &Expr::Unsigned(*r as u64))
        }
        Expr::Unsigned(r) => {
            let r = *r;
            let v = match op {
                Token::Add => l.wrapping_add(r),
                Token::Sub => l.wrapping_sub(r),
                Token::Mul => l.wrapping_mul(r),
                Token::Div if r == 0 => 0,
                Token::Div => l / r,
                Token::Mod if r == 0 => 0,
                Token::Mod => l % r,
                _ => return compare(op, l, r),
            };
            Some(Expr::Unsigned(v))
        }
        _ => None,
    }
}

fn fold_number(op: Token, l: f64, rhs: &Expr) -> Option<Expr> {
    let r = match rhs {
        Expr::Number(r) => *r,
        Expr::Integer(r) => *r as f64,
        Expr::Unsigned(r) => *r as f64,
        Expr::Nil => return Some(Expr::Boolean(false)),
        _ => return None,
    };
    let v = match op {
        Token::Add => l + r,
        Token::Sub => l - r,
        Token::Mul => l * r,
        Token::Div if r == 0.0 => 0.0,
        Token::Div => l / r,
        Token::Mod => l % r,
        _ => return compare(op, l, r),
    };
    Some(Expr::Number(v))
}

fn fold_string(op: Token, l: &str, rhs: &Expr, loc: Option<Tz>) -> Option<Expr> {
    match rhs {
        Expr::String(r) => match op {
            Token::Eq | Token::Neq => {
                let plain = Expr::Boolean((l == r) == (op == Token::Eq));
                // Two spellings of the same instant compare equal.
                if is_time_string(l) && is_time_string(r) {
                    if let (Some(tl), Some(tr)) = (to_time(l, loc), to_time(r, loc)) {
                        return Some(fold_time(op, &tl, &Expr::Time(tr), loc).unwrap_or(plain));
                    }
                }
                Some(plain)
            }
            Token::Add => Some(Expr::String(format!("{}{}", l, r))),
            _ => fold_time(op, &to_time(l, loc)?, rhs, loc),
        },
        Expr::Duration(_) | Expr::Time(_) | Expr::Integer(_) => fold_time(op, &to_time(l, loc)?, rhs, loc),
        Expr::Nil => matches!(op, Token::Eq | Token::Neq).then_some(Expr::Boolean(false)),
        _ => None,
    }
}

fn fold_time(op: Token, l: &DateTime<Utc>, rhs: &Expr, loc: Option<Tz>) -> Option<Expr> {
    match rhs {
        Expr::Duration(r) => match op {
            Token::Add => shift(l, *r),
            Token::Sub => shift(l, r.wrapping_neg()),
            _ => None,
        },
        Expr::Integer(r) => fold_time(op, l, &Expr::Duration(*r), loc),
        Expr::Time(r) => match op {
            Token::Sub => l.signed_duration_since(*r).num_nanoseconds().map(Expr::Duration),
            _ => compare(op, l, r),
        },
        Expr::String(s) => fold_time(op, l, &Expr::Time(to_time(s, loc)?), loc),
        Expr::Nil => Some(Expr::Boolean(false)),
        _ => None,
    }
}

impl SelectStatement {
    /// Copy of the statement with the condition and dimensions reduced,
    /// subqueries included.
    pub fn reduce(&self, valuer: Option<&dyn Valuer>) -> SelectStatement {
        let mut other = self.clone();
        other.condition = other.condition.take().map(|c| reduce(c, valuer));
        other.dimensions = std::mem::take(&mut other.dimensions)
            .into_iter()
            .map(|d| Dimension::new(reduce(d.expr, valuer)))
            .collect();
        for src in &mut other.sources {
            if let Source::SubQuery(inner) = src {
                *inner = Box::new(inner.reduce(valuer));
            }
        }
        other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::query::eval::{NowValuer, Value};
    use crate::query::parser::{parse_expr, parse_statement};
    use crate::query::ast::Statement;

    fn reduced(s: &str) -> String {
        reduce(parse_expr(s).unwrap(), None).to_string()
    }

    fn reduced_with(s: &str, valuer: &dyn Valuer) -> String {
        reduce(parse_expr(s).unwrap(), Some(valuer)).to_string()
    }

    fn now() -> NowValuer {
        NowValuer::new(parse_time_string("2000-01-01T00:00:00Z", None).unwrap())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(reduced("1 + 2 * 3"), "7");
        assert_eq!(reduced("(1 + 2) * 3"), "9");
        assert_eq!(reduced("10 / 4"), "2.5");
        assert_eq!(reduced("10 / 0"), "0.0");
        assert_eq!(reduced("7 % 0"), "0");
        assert_eq!(reduced("1.5 + 2"), "3.5");
        assert_eq!(reduced("2 + 1.5"), "3.5");
        assert_eq!(reduced("6 & 3"), "2");
        assert_eq!(reduced("'foo' + 'bar'"), "'foobar'");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(reduced("1 < 2"), "true");
        assert_eq!(reduced("2.5 >= 3"), "false");
        assert_eq!(reduced("true = false"), "false");
        assert_eq!(reduced("'a' != 'b'"), "true");
    }

    #[test]
    fn test_negative_integer_below_unsigned() {
        let expr = Expr::binary(Token::Lt, Expr::Integer(-1), Expr::Unsigned(5));
        assert_eq!(reduce(expr, None), Expr::Boolean(true));

        let expr = Expr::binary(Token::Gte, Expr::Integer(-1), Expr::Unsigned(5));
        assert_eq!(reduce(expr, None), Expr::Boolean(false));

        let expr = Expr::binary(Token::Gt, Expr::Unsigned(5), Expr::Integer(-1));
        assert_eq!(reduce(expr, None), Expr::Boolean(true));

        let expr = Expr::binary(Token::Add, Expr::Unsigned(5), Expr::Integer(2));
        assert_eq!(reduce(expr, None), Expr::Unsigned(7));
    }

    #[test]
    fn test_boolean_short_circuit() {
        assert_eq!(reduced("host = 'a' AND true"), "host = 'a'");
        assert_eq!(reduced("true AND host = 'a'"), "host = 'a'");
        assert_eq!(reduced("host = 'a' AND 1 > 2"), "false");
        assert_eq!(reduced("host = 'a' OR 1 < 2"), "true");
        assert_eq!(reduced("false OR host = 'a'"), "host = 'a'");
        assert_eq!(reduced("a AND (b OR false)"), "a AND b");
    }

    #[test]
    fn test_both_sides_reduced_before_folding() {
        struct Counting(Cell<usize>);
        impl Valuer for Counting {
            fn value(&self, _key: &str) -> Option<Value> {
                None
            }
            fn call(&self, name: &str, _args: &[Value]) -> Option<Value> {
                self.0.set(self.0.get() + 1);
                (name == "flag").then_some(Value::Boolean(true))
            }
        }

        let counting = Counting(Cell::new(0));
        assert_eq!(reduced_with("false AND flag()", &counting), "false");
        assert_eq!(reduced_with("true OR flag()", &counting), "true");
        assert_eq!(counting.0.get(), 2);
    }

    #[test]
    fn test_parens() {
        assert_eq!(reduced("(a + b)"), "a + b");
        assert_eq!(reduced("(a + b) * c"), "(a + b) * c");
        assert_eq!(reduced("((a)) * c"), "a * c");
        assert_eq!(reduced("(1 + 1) * c"), "2 * c");
    }

    #[test]
    fn test_durations_and_times() {
        assert_eq!(reduced("1h + 30m"), "90m");
        assert_eq!(reduced("2h * 2"), "4h");
        assert_eq!(reduced("1h / 0"), "0s");
        assert_eq!(reduced("1h > 30m"), "true");
        assert_eq!(reduced("0 + 1s"), "'1970-01-01T00:00:01Z'");
        assert_eq!(
            reduced("'2021-01-01T00:00:00Z' + 1h"),
            "'2021-01-01T01:00:00Z'"
        );
        assert_eq!(
            reduced("'2021-01-02' - '2021-01-01T00:00:00Z'"),
            "1d"
        );
    }

    #[test]
    fn test_date_strings_compare_as_times() {
        assert_eq!(reduced("'2021-01-01' = '2021-01-01T00:00:00Z'"), "true");
        assert_eq!(reduced("'2021-01-01' != '2021-01-01 00:00:00'"), "false");
        assert_eq!(reduced("'abc' = 'abc'"), "true");
    }

    #[test]
    fn test_now_and_zone() {
        let valuer = now();
        assert_eq!(
            reduced_with("time > now() - 10m", &valuer),
            "time > '1999-12-31T23:50:00Z'"
        );
        assert_eq!(reduced_with("now()", &valuer), "'2000-01-01T00:00:00Z'");

        let paris = now().with_location(Tz::Europe__Paris);
        assert_eq!(
            reduced_with("'2000-01-01 01:00:00' + 0s", &paris),
            "'2000-01-01T00:00:00Z'"
        );
    }

    #[test]
    fn test_unresolved_calls_keep_reduced_args() {
        assert_eq!(reduced("mean(1 + 1)"), "mean(2)");
        assert_eq!(reduced_with("mean(value * (2 + 3))", &now()), "mean(value * 5)");
    }

    #[test]
    fn test_valuer_substitutes_names() {
        let mut values = MapValuer::new();
        values.insert("host", Value::String("a".into())).insert("n", Value::Integer(3));
        assert_eq!(reduced_with("host = 'a' AND n > 2", &values), "true");
        assert_eq!(reduced_with("host = 'a' AND region = 'west'", &values), "region = 'west'");
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let valuer = now();
        for s in [
            "1 + 2 * 3",
            "host = 'a' AND (time > now() - 1h OR 1 = 1)",
            "(a + b) * (c - 2 * 3)",
            "'2021-01-01' < '2021-01-02' AND value > 1.5",
            "mean(value) / 2 + 1h",
            "x AND (y OR false)",
        ] {
            let once = reduce(parse_expr(s).unwrap(), Some(&valuer));
            let twice = reduce(once.clone(), Some(&valuer));
            assert_eq!(once, twice, "{}", s);
        }
    }

    #[test]
    fn test_select_reduce() {
        let Statement::Select(stmt) = parse_statement(
            "SELECT v * (1 + 1) FROM (SELECT v FROM cpu WHERE 1 = 1 AND host = 'a') \
             WHERE time > now() - 1h GROUP BY time(30m * 2)",
        )
        .unwrap() else {
            panic!("expected select");
        };
        let out = stmt.reduce(Some(&now()));
        assert_eq!(
            out.to_string(),
            "SELECT v * (1 + 1) FROM (SELECT v FROM cpu WHERE host = 'a') \
             WHERE time > '1999-12-31T23:00:00Z' GROUP BY time(1h)"
        );
    }
}
