//! Small shared helpers.

use chrono::Utc;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
