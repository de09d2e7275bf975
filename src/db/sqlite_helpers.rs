//! SQLite helper utilities for type conversion
//!
//! Timestamps and dates are stored as TEXT: RFC 3339 for instants and
//! `YYYY-MM-DD` for calendar dates.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::LedgerError;

// ============================================================================
// Timestamp Helpers (stored as ISO8601 TEXT in SQLite)
// ============================================================================

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an ISO8601 string to DateTime
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|_| LedgerError::Timestamp(s.to_string()))
}

pub fn str_to_datetime_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>, LedgerError> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(str_to_datetime(s)?)),
        _ => Ok(None),
    }
}

// ============================================================================
// Date Helpers
// ============================================================================

#[inline]
pub fn date_to_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn str_to_date_opt(s: Option<&str>) -> Result<Option<NaiveDate>, LedgerError> {
    match s {
        Some(s) if !s.is_empty() => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| LedgerError::Timestamp(s.to_string())),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_now_parses_back() {
        let before = Utc::now().timestamp();
        let parsed = str_to_datetime(&now_iso8601()).unwrap();
        assert!(parsed.timestamp() >= before);
    }

    #[test]
    fn test_sqlite_datetime_format() {
        let parsed = str_to_datetime("2024-01-15 10:30:45").unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.day(), 15);
    }

    #[test]
    fn test_invalid_datetime() {
        assert!(matches!(str_to_datetime("yesterday"), Err(LedgerError::Timestamp(_))));
        assert_eq!(str_to_datetime_opt(Some("")).unwrap(), None);
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        assert_eq!(date_to_str(date), "2026-01-07");
        assert_eq!(str_to_date_opt(Some("2026-01-07")).unwrap(), Some(date));
        assert_eq!(str_to_date_opt(None).unwrap(), None);
        assert!(str_to_date_opt(Some("07/01/2026")).is_err());
    }
}
