//! Timestamp utilities
//!
//! Storage uses Unix milliseconds; the wire uses RFC 3339.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to Unix milliseconds for storage
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Internal(format!("timestamp out of range: {} ms", millis)))
}

/// Parse a textual timestamp
///
/// Accepted forms:
/// - RFC 3339 (`2026-10-19T12:00:00Z`, any offset)
/// - `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`, interpreted as UTC
/// - decimal Unix seconds
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(secs) = raw.parse::<i64>() {
        return from_unix_seconds(secs);
    }

    Err(Error::InvalidInput(format!("unrecognized timestamp '{}'", raw)))
}

/// Parse a timestamp from a JSON value (string or integer Unix seconds)
pub fn timestamp_from_json(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::InvalidInput(format!("timestamp {} is not an integer", n)))
            .and_then(from_unix_seconds),
        other => Err(Error::InvalidInput(format!("timestamp must be a string or integer, got {}", other))),
    }
}

fn from_unix_seconds(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {}", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_millis_roundtrip_preserves_precision() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(from_millis(to_millis(ts)).unwrap(), ts);
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let ts = parse_timestamp("2026-10-19T13:00:00+01:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_forms_are_utc() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 19, 11, 58, 15).unwrap();
        assert_eq!(parse_timestamp("2026-10-19 11:58:15").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-10-19T11:58:15").unwrap(), expected);
    }

    #[test]
    fn test_parse_unix_seconds() {
        assert_eq!(
            timestamp_from_json(&json!(1_760_000_000)).unwrap().timestamp(),
            1_760_000_000
        );
        assert_eq!(
            timestamp_from_json(&json!("1760000000")).unwrap().timestamp(),
            1_760_000_000
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(timestamp_from_json(&json!(12.5)).is_err());
        assert!(timestamp_from_json(&json!(null)).is_err());
        assert!(timestamp_from_json(&json!({"t": 1})).is_err());
    }
}
