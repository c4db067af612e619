//! Events flowing through the pipeline.
//!
//! ```text
//! line watcher ──RawTransition──► debouncer ──Debounced──► dispatcher
//! broker ─────────────────────────Command────────────────► dispatcher
//! ```

use crate::line::LineId;
use crate::port::PortState;
use crate::time::Timestamp;

/// A level change observed on an input line. Not debounced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTransition {
    pub line: LineId,
    pub state: PortState,
    pub at: Timestamp,
}

impl RawTransition {
    /// Stamp a transition with the current time.
    #[must_use]
    pub fn now(line: LineId, state: PortState) -> Self {
        Self {
            line,
            state,
            at: crate::time::now(),
        }
    }
}

/// A level that held for the full quiet window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debounced {
    pub line: LineId,
    pub state: PortState,
}

/// An inbound message received on a subscribed command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub topic: String,
    pub payload: String,
}

impl Command {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
