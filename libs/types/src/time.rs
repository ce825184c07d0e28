//! Wall-clock helpers
//!
//! All stored timestamps are Unix nanoseconds (`i64`).

use chrono::Utc;

/// Current wall-clock time in Unix nanoseconds.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
