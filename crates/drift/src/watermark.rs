//! Watermark timestamps.
//!
//! A watermark is the exclusive end of a poll window, rendered as RFC-3339
//! with second precision and a `Z` suffix (`2024-01-01T00:05:00Z`). The same
//! string is handed to the sink and persisted in the checkpoint.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

/// Render a watermark for the sink and the checkpoint file.
pub fn format_watermark(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC-3339 timestamp with any offset into UTC.
pub fn parse_watermark(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc))
}

/// Drop sub-second precision.
pub fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Serde adapter that stores a timestamp as a watermark string.
pub mod serde_watermark {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_watermark(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let value = String::deserialize(deserializer)?;
        super::parse_watermark(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_has_second_precision_and_z() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(format_watermark(ts), "2024-01-01T00:05:00Z");
    }

    #[test]
    fn test_format_drops_fraction() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(format_watermark(ts), "2024-01-01T00:05:00Z");
    }

    #[test]
    fn test_parse_normalizes_offset() {
        let ts = parse_watermark("2024-01-01T02:05:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_watermark("yesterday").is_err());
    }

    #[test]
    fn test_truncate_to_second() {
        let base = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 1).unwrap();
        let ts = base + chrono::Duration::nanoseconds(999_999_999);
        assert_eq!(truncate_to_second(ts), base);
    }
}
