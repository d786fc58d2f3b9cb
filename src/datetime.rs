//! Date/time utilities for newsagg.
//!
//! Feed items carry RFC 1123 style dates (`Wed, 03 May 2023 15:04:05 +0000`);
//! the store keeps every timestamp as an RFC 3339 UTC string.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Parse a feed publication date.
///
/// Accepts RFC 2822 dates, which covers the RFC 1123 layout used by RSS
/// `pubDate` with either a numeric offset or a named zone such as `GMT`.
pub fn parse_publication_date(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc2822(s.trim()).map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp the way it is stored in the database.
pub fn to_db_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in the stored format.
pub fn now_db_string() -> String {
    to_db_string(&Utc::now())
}

/// Parse a timestamp read back from the database.
pub fn parse_db_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}
