//! Duration literals
//!
//! Durations are signed nanosecond counts. The literal syntax is a sequence of
//! `<digits><unit>` segments where the unit is one of `ns`, `u`/`µ`, `ms`, `s`,
//! `m`, `h`, `d` or `w`, optionally preceded by `-`.

use thiserror::Error;

pub const NANOSECOND: i64 = 1;
pub const MICROSECOND: i64 = 1_000 * NANOSECOND;
pub const MILLISECOND: i64 = 1_000 * MICROSECOND;
pub const SECOND: i64 = 1_000 * MILLISECOND;
pub const MINUTE: i64 = 60 * SECOND;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;
pub const WEEK: i64 = 7 * DAY;

/// Errors from [`parse_duration`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration")]
    Invalid,

    #[error("overflowed duration {measure}{unit}: choose a smaller duration or INF")]
    Overflow { measure: i64, unit: String },
}

/// Parse a duration literal such as `1h30m` or `-500ms` into nanoseconds.
pub fn parse_duration(s: &str) -> Result<i64, DurationError> {
    if s.len() < 2 {
        return Err(DurationError::Invalid);
    }

    let a: Vec<char> = s.chars().collect();
    let mut i = 0;
    let mut d: i64 = 0;

    let is_negative = a[0] == '-';
    if is_negative {
        i += 1;
    }

    let mut measure: i64 = 0;
    let mut unit = String::new();

    while i < a.len() {
        let start = i;
        while i < a.len() && a[i].is_ascii_digit() {
            i += 1;
        }
        if i >= a.len() || i == start {
            return Err(DurationError::Invalid);
        }

        let digits: String = a[start..i].iter().collect();
        let n: i64 = digits.parse().map_err(|_| DurationError::Invalid)?;
        measure = n;
        unit = a[i].to_string();

        let scale = match a[i] {
            'n' => {
                if i + 1 < a.len() && a[i + 1] == 's' {
                    unit = "ns".to_string();
                    d = d.wrapping_add(n);
                    i += 2;
                    continue;
                }
                return Err(DurationError::Invalid);
            }
            'u' | 'µ' => MICROSECOND,
            'm' => {
                if i + 1 < a.len() && a[i + 1] == 's' {
                    unit = "ms".to_string();
                    d = d.wrapping_add(n.wrapping_mul(MILLISECOND));
                    i += 2;
                    continue;
                }
                MINUTE
            }
            's' => SECOND,
            'h' => HOUR,
            'd' => DAY,
            'w' => WEEK,
            _ => return Err(DurationError::Invalid),
        };
        d = d.wrapping_add(n.wrapping_mul(scale));
        i += 1;
    }

    if d < 0 && !is_negative {
        return Err(DurationError::Overflow { measure, unit });
    }

    if is_negative {
        d = d.wrapping_neg();
    }
    Ok(d)
}

/// Format nanoseconds using the largest unit that divides them exactly.
pub fn format_duration(d: i64) -> String {
    if d == 0 {
        "0s".to_string()
    } else if d % WEEK == 0 {
        format!("{}w", d / WEEK)
    } else if d % DAY == 0 {
        format!("{}d", d / DAY)
    } else if d % HOUR == 0 {
        format!("{}h", d / HOUR)
    } else if d % MINUTE == 0 {
        format!("{}m", d / MINUTE)
    } else if d % SECOND == 0 {
        format!("{}s", d / SECOND)
    } else if d % MILLISECOND == 0 {
        format!("{}ms", d / MILLISECOND)
    } else if d % MICROSECOND == 0 {
        format!("{}u", d / MICROSECOND)
    } else {
        format!("{}ns", d)
    }
}
