// src/utils/time.rs

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Parses the timestamp formats the backend emits: RFC 3339 with an offset,
/// or a bare `YYYY-MM-DDTHH:MM:SS[.fff]` that is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("Invalid timestamp: {}", raw)))
}

pub fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid timestamp: {}", raw))),
    }
}

/// Formats a countdown as `m:ss` (minutes are not wrapped into hours).
pub fn format_countdown(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Whole minutes between two instants, rounded down, never negative.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}

pub fn format_local(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_offset_and_naive() {
        let with_offset = parse_timestamp("2024-05-01T10:00:00+02:00").unwrap();
        let naive = parse_timestamp("2024-05-01T08:00:00.123").unwrap();
        assert_eq!(with_offset, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        assert_eq!(naive.timestamp(), with_offset.timestamp());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(600), "10:00");
        assert_eq!(format_countdown(59), "0:59");
        assert_eq!(format_countdown(0), "0:00");
    }

    #[test]
    fn test_minutes_between_floors() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 9, 14, 59).unwrap();
        assert_eq!(minutes_between(start, end), 14);
        assert_eq!(minutes_between(end, start), 0);
    }
}
