//! Timestamp utilities
//!
//! Submission times are stored as strings. The format is fixed-width so that
//! lexicographic order equals chronological order, which the merge ordering
//! relies on.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Storage format for `submission_time`
pub const SUBMISSION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time formatted for the `submission_time` field
pub fn submission_timestamp() -> String {
    format_submission_time(&now())
}

/// Format a timestamp for the `submission_time` field
pub fn format_submission_time(at: &DateTime<Utc>) -> String {
    at.format(SUBMISSION_TIME_FORMAT).to_string()
}

/// Parse a stored `submission_time`, accepting values written without
/// milliseconds by older stores
pub fn parse_submission_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, SUBMISSION_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}
