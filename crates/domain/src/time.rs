//! Timestamps attached to raw line transitions.

use chrono::{DateTime, Utc};

/// UTC wall-clock time at which a transition was observed.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render a timestamp with millisecond precision for log lines.
#[must_use]
pub fn log_format(ts: &Timestamp) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}
