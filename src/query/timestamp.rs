//! Timestamp helpers
//!
//! Timestamps are nanoseconds since the Unix epoch. Strings that look like
//! dates (`2021-01-01`) or date-times (`2021-01-01 10:00:00`,
//! `2021-01-01T10:00:00Z`) may be reinterpreted as time literals.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use super::error::{QueryError, QueryResult};

/// Smallest representable timestamp. Two values below it are reserved.
pub const MIN_TIME: i64 = i64::MIN + 2;

/// Largest representable timestamp. One value above it is reserved.
pub const MAX_TIME: i64 = i64::MAX - 1;

/// Layout of a date-only time literal
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Layout of a date-time time literal; the fractional part is optional
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn date_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").ok()).as_ref()
}

fn date_time_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}.+").ok()).as_ref()
}

/// Whether `s` looks like a date-only literal
pub fn is_date_string(s: &str) -> bool {
    date_regex().map_or(false, |re| re.is_match(s))
}

/// Whether `s` looks like a date-time literal
pub fn is_date_time_string(s: &str) -> bool {
    date_time_regex().map_or(false, |re| re.is_match(s))
}

/// Whether `s` looks like either form of time literal
pub fn is_time_string(s: &str) -> bool {
    is_date_time_string(s) || is_date_string(s)
}

/// Interpret a date or date-time string in the given zone (UTC when `None`).
pub fn parse_time_string(s: &str, zone: Option<Tz>) -> QueryResult<DateTime<Utc>> {
    let zone = zone.unwrap_or(Tz::UTC);

    if is_date_time_string(s) {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT) {
            return localize(naive, zone);
        }
        return DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| QueryError::InvalidTime);
    }

    if is_date_string(s) {
        let date = NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| QueryError::InvalidTime)?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or(QueryError::InvalidTime)?;
        return localize(midnight, zone);
    }

    Err(QueryError::InvalidTime)
}

fn localize(naive: NaiveDateTime, zone: Tz) -> QueryResult<DateTime<Utc>> {
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or(QueryError::InvalidTime)
}

/// Timestamp for a nanosecond count since the epoch
pub fn time_from_nanos(ns: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(ns)
}

/// Nanoseconds since the epoch, saturating outside the representable range
pub fn unix_nanos(t: &DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(if t.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Format as RFC 3339 with the shortest exact fractional second.
pub fn format_rfc3339_nano(t: &DateTime<Utc>) -> String {
    let mut out = t.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = t.timestamp_subsec_nanos();
    if nanos > 0 {
        let frac = format!("{:09}", nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('Z');
    out
}

/// Format as RFC 3339 with whole seconds
pub fn format_rfc3339(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_detection() {
        assert!(is_date_string("2021-01-01"));
        assert!(!is_date_string("2021-01-01T00:00:00Z"));
        assert!(is_date_time_string("2021-01-01T00:00:00Z"));
        assert!(is_date_time_string("2021-01-01 00:00:00"));
        assert!(!is_date_time_string("2021-01-01"));
        assert!(!is_time_string("cpu"));
    }

    #[test]
    fn test_parse_time_string_forms() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_time_string("2021-01-01", None).unwrap(), expected);
        assert_eq!(parse_time_string("2021-01-01 00:00:00", None).unwrap(), expected);
        assert_eq!(parse_time_string("2021-01-01T00:00:00Z", None).unwrap(), expected);

        let t = parse_time_string("2021-01-01 00:00:00.5", None).unwrap();
        assert_eq!(t.timestamp_subsec_nanos(), 500_000_000);
    }

    #[test]
    fn test_parse_time_string_in_zone() {
        let t = parse_time_string("2021-01-01", Some(chrono_tz::America::New_York)).unwrap();
        assert_eq!(format_rfc3339_nano(&t), "2021-01-01T05:00:00Z");
    }

    #[test]
    fn test_parse_time_string_invalid() {
        assert!(matches!(
            parse_time_string("2021-13-45", None),
            Err(QueryError::InvalidTime)
        ));
        assert!(matches!(
            parse_time_string("2021-01-01Tgarbage", None),
            Err(QueryError::InvalidTime)
        ));
    }

    #[test]
    fn test_format_rfc3339_nano_trims_zeros() {
        assert_eq!(format_rfc3339_nano(&time_from_nanos(0)), "1970-01-01T00:00:00Z");
        assert_eq!(format_rfc3339_nano(&time_from_nanos(1_500_000_000)), "1970-01-01T00:00:01.5Z");
        assert_eq!(format_rfc3339_nano(&time_from_nanos(1)), "1970-01-01T00:00:00.000000001Z");
    }

    #[test]
    fn test_nanos_round_trip() {
        let t = time_from_nanos(1_609_459_200_000_000_001);
        assert_eq!(unix_nanos(&t), 1_609_459_200_000_000_001);
        assert_eq!(unix_nanos(&time_from_nanos(MIN_TIME)), MIN_TIME);
        assert_eq!(unix_nanos(&time_from_nanos(MAX_TIME)), MAX_TIME);
    }
}
