//! Natural-language timeframe parsing.
//!
//! Accepts `\d+[hdwm]` (hour, day, week, 30-day month) plus a few natural
//! forms (`today`, `yesterday`, `last week`, `N days ago`) and absolute
//! ISO-8601 instants. The result is the `since` cutoff; future instants and
//! unrecognized strings are errors.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*([hdwm])$").unwrap())
}

fn days_ago_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s+days?\s+ago$").unwrap())
}

/// Parse a timeframe into its `since` instant, relative to now.
pub fn parse_timeframe(timeframe: &str) -> Result<DateTime<Utc>> {
    parse_timeframe_at(timeframe, Utc::now())
}

/// Parse a timeframe against an explicit `now` (for tests).
pub fn parse_timeframe_at(timeframe: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let raw = timeframe.trim().to_lowercase();
    if raw.is_empty() {
        return Err(Error::Timeframe("empty timeframe".to_string()));
    }

    if let Some(caps) = relative_re().captures(&raw) {
        let amount: u32 = caps[1]
            .parse()
            .map_err(|_| Error::Timeframe(format!("amount out of range: {timeframe}")))?;
        let duration = match &caps[2] {
            "h" => Duration::hours(amount as i64),
            "d" => Duration::days(amount as i64),
            "w" => Duration::weeks(amount as i64),
            _ => Duration::days(amount as i64 * 30),
        };
        return Ok(now - duration);
    }

    if let Some(caps) = days_ago_re().captures(&raw) {
        let days: u32 = caps[1]
            .parse()
            .map_err(|_| Error::Timeframe(format!("amount out of range: {timeframe}")))?;
        return Ok(now - Duration::days(days as i64));
    }

    match raw.as_str() {
        "today" => return Ok(start_of_day(now)),
        "yesterday" => return Ok(start_of_day(now - Duration::days(1))),
        "last week" => return Ok(now - Duration::weeks(1)),
        _ => {}
    }

    // Absolute instants are accepted as long as they are in the past
    let absolute = DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        });

    match absolute {
        Some(instant) if instant > now => {
            Err(Error::Timeframe(format!("timeframe is in the future: {timeframe}")))
        }
        Some(instant) => Ok(instant),
        None => Err(Error::Timeframe(format!("unrecognized timeframe: {timeframe}"))),
    }
}

fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_relative_units() {
        let now = now();
        assert_eq!(parse_timeframe_at("6h", now).unwrap(), now - Duration::hours(6));
        assert_eq!(parse_timeframe_at("7d", now).unwrap(), now - Duration::days(7));
        assert_eq!(parse_timeframe_at("2w", now).unwrap(), now - Duration::weeks(2));
        assert_eq!(parse_timeframe_at("1m", now).unwrap(), now - Duration::days(30));
    }

    #[test]
    fn test_natural_forms() {
        let now = now();
        assert_eq!(
            parse_timeframe_at("today", now).unwrap().to_rfc3339(),
            "2025-06-15T00:00:00+00:00"
        );
        assert_eq!(
            parse_timeframe_at("Yesterday", now).unwrap().to_rfc3339(),
            "2025-06-14T00:00:00+00:00"
        );
        assert_eq!(parse_timeframe_at("last week", now).unwrap(), now - Duration::weeks(1));
        assert_eq!(parse_timeframe_at("3 days ago", now).unwrap(), now - Duration::days(3));
        assert_eq!(parse_timeframe_at("1 day ago", now).unwrap(), now - Duration::days(1));
    }

    #[test]
    fn test_absolute_past_accepted() {
        let now = now();
        assert_eq!(
            parse_timeframe_at("2025-06-01", now).unwrap().to_rfc3339(),
            "2025-06-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_invalid_and_future_rejected() {
        let now = now();
        assert!(parse_timeframe_at("", now).is_err());
        assert!(parse_timeframe_at("banana", now).is_err());
        assert!(parse_timeframe_at("7x", now).is_err());
        assert!(parse_timeframe_at("2099-01-01", now).is_err());
        assert!(parse_timeframe_at("999999999999d", now).is_err());
    }
}
