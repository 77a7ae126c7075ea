//! Shared timestamp helpers for registry rows and instance metadata.

use chrono::{Local, SecondsFormat, Utc};

/// RFC 3339 UTC timestamp used for `created_at`/`updated_at` columns.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Local calendar date (`YYYY-MM-DD`) recorded as an instance's creation date.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}
