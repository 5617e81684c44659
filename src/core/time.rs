//! Shared timestamp/event helpers for envelopes, file names and log entries.

use chrono::{DateTime, SecondsFormat, Utc};
use ulid::Ulid;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// ISO-8601 UTC with millisecond precision (e.g. `2026-10-16T09:04:05.123Z`).
pub fn iso(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    iso(&now())
}

/// ISO-8601 stamp that is safe inside a file name: `:` and `.` become `-`.
pub fn file_stamp(at: &DateTime<Utc>) -> String {
    iso(at).replace([':', '.'], "-")
}

/// Calendar day in UTC, `YYYY-MM-DD`.
pub fn day(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}
