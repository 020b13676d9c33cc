//! Coarse elapsed-time formatting for AFK notices.

use chrono::{DateTime, Utc};

const MINUTE: f64 = 60.0;
const HOUR: f64 = 3_600.0;
const DAY: f64 = 86_400.0;

/// Render elapsed seconds as a single truncated bucket: seconds, minutes,
/// hours or days. `59.9` is `"59 seconds"`, `3599` is `"59 minutes"`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };

    if seconds < MINUTE {
        format!("{} seconds", seconds as u64)
    } else if seconds < HOUR {
        format!("{} minutes", (seconds / MINUTE) as u64)
    } else if seconds < DAY {
        format!("{} hours", (seconds / HOUR) as u64)
    } else {
        format!("{} days", (seconds / DAY) as u64)
    }
}

/// Seconds between `since` and `now`, with millisecond resolution.
#[allow(clippy::cast_precision_loss)]
pub fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - since).num_milliseconds() as f64;
    millis / 1000.0
}

/// Shorthand for `format_duration(elapsed_secs(since, now))`.
pub fn format_since(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_duration(elapsed_secs(since, now))
}
