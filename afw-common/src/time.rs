//! Timestamp utilities
//!
//! Records store lifecycle timestamps as Unix epoch milliseconds.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as Unix epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Interpret a JSON value as epoch milliseconds
///
/// Accepts integers, floats (truncated) and RFC 3339 strings. Anything else
/// yields `None`.
pub fn timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_rfc3339_ms(s).or_else(|| s.trim().parse::<i64>().ok()),
        _ => None,
    }
}

/// Parse an RFC 3339 string to epoch milliseconds
pub fn parse_rfc3339_ms(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Check a calendar date in `YYYY-MM-DD` form
pub fn is_valid_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_now_ms_is_milliseconds() {
        let ms = now_ms();
        assert!(ms > 946_684_800_000);
        assert!(ms < 4_102_444_800_000);
    }

    #[test]
    fn test_timestamp_ms_from_integer() {
        assert_eq!(timestamp_ms(&json!(1_700_000_000_123i64)), Some(1_700_000_000_123));
    }

    #[test]
    fn test_timestamp_ms_from_float() {
        assert_eq!(timestamp_ms(&json!(12.9)), Some(12));
    }

    #[test]
    fn test_timestamp_ms_from_rfc3339() {
        assert_eq!(timestamp_ms(&json!("1970-01-01T00:00:01Z")), Some(1000));
    }

    #[test]
    fn test_timestamp_ms_from_numeric_string() {
        assert_eq!(timestamp_ms(&json!("42")), Some(42));
    }

    #[test]
    fn test_timestamp_ms_rejects_garbage() {
        assert_eq!(timestamp_ms(&json!("yesterday")), None);
        assert_eq!(timestamp_ms(&json!(null)), None);
        assert_eq!(timestamp_ms(&json!([1])), None);
    }

    #[test]
    fn test_is_valid_date() {
        assert!(is_valid_date("2024-02-29"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(!is_valid_date("02/01/2024"));
    }
}
