//! SQLite helper utilities for type conversion
//!
//! SQLite has no native UUID, date or boolean types. This module converts
//! between the Rust types on the records and their stored representations:
//! UUIDs and RFC 3339 timestamps as TEXT, dates as `YYYY-MM-DD` TEXT,
//! booleans as 0/1 INTEGER.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Convert a UUID to a SQLite-compatible string
#[inline]
pub fn uuid_to_str(id: Uuid) -> String {
    id.to_string()
}

/// Parse a SQLite string back to a UUID
#[inline]
pub fn str_to_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| anyhow!("Invalid UUID '{}': {}", s, e))
}

/// Convert a chrono DateTime to an RFC 3339 string
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse an RFC 3339 string to DateTime
#[inline]
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Also accept SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

/// Parse an optional datetime string
#[inline]
pub fn str_to_datetime_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(str_to_datetime(s)?)),
        _ => Ok(None),
    }
}

/// Convert a NaiveDate to a `YYYY-MM-DD` string
#[inline]
pub fn date_to_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse an optional `YYYY-MM-DD` string to a NaiveDate
#[inline]
pub fn str_to_date_opt(s: Option<&str>) -> Result<Option<NaiveDate>> {
    match s {
        Some(s) if !s.is_empty() => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| anyhow!("Invalid date '{}': {}", s, e)),
        _ => Ok(None),
    }
}

/// Convert bool to SQLite integer (0 or 1)
#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert SQLite integer to bool
#[inline]
pub fn int_to_bool(i: i32) -> bool {
    i != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_uuid_roundtrip() {
        let id = Uuid::new_v4();
        let s = uuid_to_str(id);
        let parsed = str_to_uuid(&s).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_invalid_uuid() {
        assert!(str_to_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn test_datetime_roundtrip() {
        let dt = Utc::now();
        let s = datetime_to_str(dt);
        let parsed = str_to_datetime(&s).unwrap();
        // Compare to second precision (rfc3339 might have slight differences)
        assert_eq!(dt.timestamp(), parsed.timestamp());
    }

    #[test]
    fn test_sqlite_datetime_format() {
        let s = "2024-01-15 10:30:45";
        let parsed = str_to_datetime(s).unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.day(), 15);
    }

    #[test]
    fn test_date_roundtrip() {
        let date = NaiveDate::from_ymd_opt(1965, 7, 31).unwrap();
        let s = date_to_str(date);
        assert_eq!(s, "1965-07-31");
        let parsed = str_to_date_opt(Some(&s)).unwrap();
        assert_eq!(parsed, Some(date));
    }

    #[test]
    fn test_empty_date_is_none() {
        assert_eq!(str_to_date_opt(None).unwrap(), None);
        assert_eq!(str_to_date_opt(Some("")).unwrap(), None);
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(bool_to_int(true), 1);
        assert_eq!(bool_to_int(false), 0);
        assert!(int_to_bool(1));
        assert!(int_to_bool(42)); // Any non-zero is true
        assert!(!int_to_bool(0));
    }
}
