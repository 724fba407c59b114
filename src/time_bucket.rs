//! Time bucketing utilities
//!
//! All day boundaries are UTC. Timestamps are stored as Unix milliseconds and
//! days as "YYYY-MM-DD" strings, so SQL can range-filter and group cheaply.

use chrono::{DateTime, NaiveDate, Utc};

/// Compute the day bucket string from a Unix timestamp in milliseconds.
///
/// Returns a string in format "YYYY-MM-DD".
///
/// # Example
/// ```
/// use questhook::time_bucket::day_bucket;
/// assert_eq!(day_bucket(1703721600000), "2023-12-28");
/// ```
pub fn day_bucket(timestamp_ms: i64) -> String {
    let dt = DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_else(Utc::now);
    format_day(dt.date_naive())
}

/// Format a date as "YYYY-MM-DD".
pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Parse a "YYYY-MM-DD" bucket.
pub fn parse_day(bucket: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(bucket, "%Y-%m-%d").ok()
}

/// Start of the UTC day containing `at`.
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(at)
}

/// Convert stored milliseconds back into a timestamp.
pub fn from_millis(timestamp_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_bucket() {
        // 2023-12-28 12:34:56 UTC
        assert_eq!(day_bucket(1703766896000), "2023-12-28");
    }

    #[test]
    fn test_parse_day_roundtrip() {
        let day = parse_day("2026-02-28").unwrap();
        assert_eq!(format_day(day), "2026-02-28");
        assert_eq!(parse_day("2026-02-30"), None);
        assert_eq!(parse_day("yesterday"), None);
    }

    #[test]
    fn test_start_of_day() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 17, 45, 3).unwrap();
        assert_eq!(
            start_of_day(at),
            Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_from_millis() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 1, 2, 3).unwrap();
        assert_eq!(from_millis(at.timestamp_millis()), at);
    }
}
