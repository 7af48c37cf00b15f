//! Request timestamp parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Naive formats accepted after RFC 3339. The last one is what an HTML
/// `datetime-local` input submits.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// The timestamp is in none of the accepted formats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp '{input}' (expected RFC 3339 or YYYY-MM-DDTHH:MM:SS)")]
pub struct TimestampError {
    /// The rejected input.
    pub input: String,
}

/// Parses a request timestamp into wall-clock time.
///
/// RFC 3339 input keeps the wall-clock of its own offset
/// (`2024-06-15T08:30:00-04:00` is hour 8).
///
/// # Errors
///
/// Returns [`TimestampError`] if no accepted format matches.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, TimestampError> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| TimestampError {
            input: input.to_string(),
        })
}

/// Current UTC wall-clock time, used when a request carries no timestamp.
#[must_use]
pub fn now_utc() -> NaiveDateTime {
    Utc::now().naive_utc()
}
