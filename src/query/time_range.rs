//! Splitting a WHERE clause into a time range and a residual condition
//!
//! Comparisons against `time` are removed from the condition and folded into
//! a [`TimeRange`]. Both bounds are inclusive, so `time > t` becomes a lower
//! bound of `t + 1ns`.
//!
//! Ranges from both sides of an `OR` are intersected exactly like ranges from
//! an `AND`. `time < 10 OR time > 20` therefore yields the empty range
//! `[21, 9]`, not the union of the two windows.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use super::error::{QueryError, QueryResult};
use super::eval::Valuer;
use super::expr::Expr;
use super::reduce::{reduce, reduce_expr};
use super::timestamp::{
    format_rfc3339, format_rfc3339_nano, is_time_string, parse_time_string, time_from_nanos,
    unix_nanos, MAX_TIME, MIN_TIME,
};
use super::token::Token;

/// An inclusive range of time; a missing bound is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(min: Option<DateTime<Utc>>, max: Option<DateTime<Utc>>) -> Self {
        Self { min, max }
    }

    /// Narrow to the overlap with `other`; a bound present on only one side
    /// is kept.
    pub fn intersect(&self, other: &TimeRange) -> TimeRange {
        let min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        TimeRange { min, max }
    }

    /// Whether neither bound is set
    pub fn is_zero(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn min_time(&self) -> DateTime<Utc> {
        self.min.unwrap_or_else(|| time_from_nanos(MIN_TIME))
    }

    pub fn max_time(&self) -> DateTime<Utc> {
        self.max.unwrap_or_else(|| time_from_nanos(MAX_TIME))
    }

    /// Lower bound in nanoseconds, [`MIN_TIME`] when unbounded
    pub fn min_time_nano(&self) -> i64 {
        self.min.as_ref().map_or(MIN_TIME, unix_nanos)
    }

    /// Upper bound in nanoseconds, [`MAX_TIME`] when unbounded
    pub fn max_time_nano(&self) -> i64 {
        self.max.as_ref().map_or(MAX_TIME, unix_nanos)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            format_rfc3339_nano(&self.min_time()),
            format_rfc3339_nano(&self.max_time())
        )
    }
}

/// Extract the time range from `cond` and return what is left of the
/// condition. A residual condition that reduces to `true` is `None`.
pub fn condition_expr(cond: &Expr, valuer: Option<&dyn Valuer>) -> QueryResult<(Option<Expr>, TimeRange)> {
    let (expr, range) = split_condition(cond, valuer)?;
    let expr = match expr {
        Some(Expr::Paren(inner)) => Some(*inner),
        other => other,
    };
    let expr = expr.filter(|e| !e.is_true());
    Ok((expr, range))
}

fn split_condition(cond: &Expr, valuer: Option<&dyn Valuer>) -> QueryResult<(Option<Expr>, TimeRange)> {
    match cond {
        Expr::Binary(b) if matches!(b.op, Token::And | Token::Or) => {
            let (lhs, lhs_range) = split_condition(&b.lhs, valuer)?;
            let (rhs, rhs_range) = split_condition(&b.rhs, valuer)?;
            let range = lhs_range.intersect(&rhs_range);

            let expr = match (lhs, rhs) {
                (lhs, None) => lhs,
                (None, rhs) => rhs,
                (Some(lhs), Some(rhs)) => Some(reduce_expr(Expr::binary(b.op, lhs, rhs), None)),
            };
            Ok((expr, range))
        }
        Expr::Binary(b) => {
            if is_time_ref(&b.lhs) {
                return Ok((None, time_range(b.op, &b.rhs, valuer)?));
            }
            if is_time_ref(&b.rhs) {
                let op = match b.op {
                    Token::Gt => Token::Lt,
                    Token::Lt => Token::Gt,
                    Token::Gte => Token::Lte,
                    Token::Lte => Token::Gte,
                    op => op,
                };
                return Ok((None, time_range(op, &b.lhs, valuer)?));
            }
            Ok((Some(reduce_expr(cond.clone(), valuer)), TimeRange::default()))
        }
        Expr::Paren(inner) => {
            let (expr, range) = split_condition(inner, valuer)?;
            Ok((expr.map(|e| reduce_expr(Expr::paren(e), None)), range))
        }
        Expr::Boolean(_) => Ok((Some(cond.clone()), TimeRange::default())),
        other => Err(QueryError::Condition(format!(
            "invalid condition expression: {}",
            other
        ))),
    }
}

fn is_time_ref(expr: &Expr) -> bool {
    matches!(expr, Expr::VarRef(r) if r.val.eq_ignore_ascii_case("time"))
}

/// Range for `time op rhs`
fn time_range(op: Token, rhs: &Expr, valuer: Option<&dyn Valuer>) -> QueryResult<TimeRange> {
    let mut rhs = rhs.clone();
    if let Expr::String(s) = &rhs {
        if is_time_string(s) {
            rhs = Expr::Time(parse_time_string(s, valuer.and_then(|v| v.zone()))?);
        }
    }

    // now() and friends
    let value = match reduce(rhs, valuer) {
        Expr::Time(t) => {
            if t > time_from_nanos(MAX_TIME) {
                return Err(QueryError::Condition(format!(
                    "time {} overflows time literal",
                    format_rfc3339(&t)
                )));
            } else if t < time_from_nanos(MIN_TIME + 1) {
                return Err(QueryError::Condition(format!(
                    "time {} underflows time literal",
                    format_rfc3339(&t)
                )));
            }
            t
        }
        Expr::Duration(ns) | Expr::Integer(ns) => time_from_nanos(ns),
        Expr::Number(v) => time_from_nanos(v as i64),
        other => {
            return Err(QueryError::Condition(format!(
                "invalid operation: time and {} are not compatible",
                kind_name(&other)
            )))
        }
    };

    let one = Duration::nanoseconds(1);
    let range = match op {
        Token::Gt => TimeRange::new(Some(value.checked_add_signed(one).unwrap_or(value)), None),
        Token::Gte => TimeRange::new(Some(value), None),
        Token::Lt => TimeRange::new(None, Some(value.checked_sub_signed(one).unwrap_or(value))),
        Token::Lte => TimeRange::new(None, Some(value)),
        Token::Eq => TimeRange::new(Some(value), Some(value)),
        op => {
            return Err(QueryError::Condition(format!(
                "invalid time comparison operator: {}",
                op
            )))
        }
    };
    Ok(range)
}

fn kind_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Binary(_) => "binary expression",
        Expr::Paren(_) => "parenthesized expression",
        Expr::Call(_) => "call",
        Expr::VarRef(_) => "variable reference",
        Expr::Distinct(_) => "distinct",
        Expr::Wildcard(_) => "wildcard",
        Expr::BoundParameter(_) => "bound parameter",
        Expr::Boolean(_) => "boolean literal",
        Expr::Integer(_) => "integer literal",
        Expr::Unsigned(_) => "unsigned literal",
        Expr::Number(_) => "number literal",
        Expr::String(_) => "string literal",
        Expr::Duration(_) => "duration literal",
        Expr::Time(_) => "time literal",
        Expr::Regex(_) => "regex literal",
        Expr::List(_) => "list literal",
        Expr::Nil => "nil literal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::eval::NowValuer;
    use crate::query::parser::parse_expr;
    use chrono_tz::Tz;

    fn split(s: &str) -> QueryResult<(Option<Expr>, TimeRange)> {
        condition_expr(&parse_expr(s).unwrap(), None)
    }

    fn t(s: &str) -> DateTime<Utc> {
        parse_time_string(s, None).unwrap()
    }

    #[test]
    fn test_day_window_with_residual() {
        let (expr, range) = split(
            "time >= '2021-01-01T00:00:00Z' AND time < '2021-01-02T00:00:00Z' AND host = 'a'",
        )
        .unwrap();
        assert_eq!(expr.unwrap().to_string(), "host = 'a'");
        assert_eq!(range.min, Some(t("2021-01-01T00:00:00Z")));
        assert_eq!(range.max, Some(t("2021-01-01T23:59:59.999999999Z")));
    }

    #[test]
    fn test_strict_bounds_shift_by_one_nanosecond() {
        let (expr, range) = split("time > 10 AND time < 20").unwrap();
        assert!(expr.is_none());
        assert_eq!(range.min_time_nano(), 11);
        assert_eq!(range.max_time_nano(), 19);

        let (_, range) = split("time = 5").unwrap();
        assert_eq!((range.min_time_nano(), range.max_time_nano()), (5, 5));
    }

    #[test]
    fn test_time_on_the_right_flips_operator() {
        let (_, range) = split("'2021-01-01T00:00:00Z' < time").unwrap();
        assert_eq!(range.min, Some(t("2021-01-01T00:00:00.000000001Z")));
        assert!(range.max.is_none());

        let (_, range) = split("10 >= TIME").unwrap();
        assert_eq!(range.max_time_nano(), 10);
    }

    #[test]
    fn test_or_ranges_are_intersected() {
        // Disjoint windows joined by OR still intersect, leaving min > max.
        let (expr, range) = split("time < 10 OR time > 20").unwrap();
        assert!(expr.is_none());
        assert_eq!(range.min_time_nano(), 21);
        assert_eq!(range.max_time_nano(), 9);

        let (expr, _) = split("(host = 'a' OR host = 'b') AND time > 0").unwrap();
        assert_eq!(expr.unwrap().to_string(), "host = 'a' OR host = 'b'");
    }

    #[test]
    fn test_unbounded_range_uses_sentinels() {
        let (expr, range) = split("host = 'a'").unwrap();
        assert_eq!(expr.unwrap().to_string(), "host = 'a'");
        assert!(range.is_zero());
        assert_eq!(range.min_time_nano(), MIN_TIME);
        assert_eq!(range.max_time_nano(), MAX_TIME);
    }

    #[test]
    fn test_true_residual_is_dropped() {
        let (expr, range) = split("time > 10 AND 1 = 1").unwrap();
        assert!(expr.is_none());
        assert_eq!(range.min_time_nano(), 11);
    }

    #[test]
    fn test_now_and_zone() {
        let now = NowValuer::new(t("2021-06-01T12:00:00Z")).with_location(Tz::America__New_York);
        let (_, range) = condition_expr(
            &parse_expr("time > now() - 1h AND time <= '2021-06-01'").unwrap(),
            Some(&now),
        )
        .unwrap();
        assert_eq!(range.min, Some(t("2021-06-01T11:00:00.000000001Z")));
        assert_eq!(range.max, Some(t("2021-06-01T04:00:00Z")));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            split("time > 'abc'").unwrap_err().to_string(),
            "invalid operation: time and string literal are not compatible"
        );
        assert_eq!(
            split("time != 10").unwrap_err().to_string(),
            "invalid time comparison operator: !="
        );
        assert_eq!(
            split("host").unwrap_err().to_string(),
            "invalid condition expression: host"
        );
        assert_eq!(
            split("time > '2262-04-12T00:00:00Z'").unwrap_err().to_string(),
            "time 2262-04-12T00:00:00Z overflows time literal"
        );
        assert_eq!(
            split("time > '1677-09-21T00:00:00Z'").unwrap_err().to_string(),
            "time 1677-09-21T00:00:00Z underflows time literal"
        );
    }

    #[test]
    fn test_intersect_keeps_one_sided_bounds() {
        let a = TimeRange::new(Some(time_from_nanos(5)), None);
        let b = TimeRange::new(Some(time_from_nanos(3)), Some(time_from_nanos(9)));
        let r = a.intersect(&b);
        assert_eq!(r, TimeRange::new(Some(time_from_nanos(5)), Some(time_from_nanos(9))));
        assert_eq!(r.to_string(), "[1970-01-01T00:00:00.000000005Z, 1970-01-01T00:00:00.000000009Z]");
    }
}
