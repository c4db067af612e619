//! Debouncer: turns noisy raw transitions into one event per actuation.
//!
//! Each line has at most one pending value and one quiet-window timer. A raw
//! transition records the pending value and restarts the line's timer. When
//! the timer expires without a newer transition the pending value is
//! compared with the last stable value for that line: if it differs, a
//! [`Debounced`] event is emitted and becomes the new stable value.
//!
//! ```text
//! raw:     ─┐_┌┐_┌──────────────            (bounce, settles high)
//! timer:    |r r r r|── quiet ──|
//! emitted:                      ▲ On
//! ```
//!
//! All timers live in one [`DelayQueue`], keyed by line, so the debouncer is
//! a single task no matter how many lines are watched, and a busy line never
//! delays another one.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;
use tracing::{debug, trace};

use gpiobridge_domain::event::{Debounced, RawTransition};
use gpiobridge_domain::line::LineId;
use gpiobridge_domain::port::PortState;
use gpiobridge_domain::time::log_format;

/// Quiet window applied when the configuration does not override it.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(50);

struct Pending {
    key: Key,
    state: PortState,
}

/// Per-line debouncing filter.
pub struct Debouncer {
    window: Duration,
    timers: DelayQueue<LineId>,
    pending: HashMap<LineId, Pending>,
    stable: HashMap<LineId, PortState>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_WINDOW)
    }
}

impl Debouncer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timers: DelayQueue::new(),
            pending: HashMap::new(),
            stable: HashMap::new(),
        }
    }

    /// Seed the last known stable value of lines, usually read at claim time.
    ///
    /// A burst that settles back on the seeded value emits nothing.
    #[must_use]
    pub fn with_stable(mut self, levels: impl IntoIterator<Item = (LineId, PortState)>) -> Self {
        self.stable.extend(levels);
        self
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a raw transition and (re)start the line's quiet window.
    fn observe(&mut self, transition: RawTransition) {
        trace!(
            line = %transition.line,
            state = %transition.state,
            at = %log_format(&transition.at),
            "raw transition"
        );
        if let Some(pending) = self.pending.get_mut(&transition.line) {
            pending.state = transition.state;
            self.timers.reset(&pending.key, self.window);
        } else {
            let key = self.timers.insert(transition.line, self.window);
            self.pending.insert(
                transition.line,
                Pending {
                    key,
                    state: transition.state,
                },
            );
        }
    }

    /// The quiet window of `line` elapsed.
    fn settle(&mut self, line: LineId) -> Option<Debounced> {
        let pending = self.pending.remove(&line)?;
        if self.stable.get(&line) == Some(&pending.state) {
            debug!(line = %line, state = %pending.state, "bounce suppressed");
            return None;
        }
        self.stable.insert(line, pending.state);
        Some(Debounced {
            line,
            state: pending.state,
        })
    }

    /// Consume `raw` until it closes and every pending window has elapsed,
    /// sending stable events on `out`.
    ///
    /// Stops early if `out` is closed.
    pub async fn run(
        mut self,
        mut raw: mpsc::UnboundedReceiver<RawTransition>,
        out: mpsc::UnboundedSender<Debounced>,
    ) {
        debug!(window = ?self.window, "debouncer started");
        let mut raw_open = true;
        while raw_open || !self.timers.is_empty() {
            tokio::select! {
                transition = raw.recv(), if raw_open => match transition {
                    Some(transition) => self.observe(transition),
                    None => {
                        debug!(pending = self.pending.len(), "raw transition stream closed");
                        raw_open = false;
                    }
                },
                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    if let Some(event) = self.settle(expired.into_inner()) {
                        debug!(line = %event.line, state = %event.state, "stable transition");
                        if out.send(event).is_err() {
                            debug!("debounced event receiver dropped");
                            return;
                        }
                    }
                }
                else => break,
            }
        }
        debug!("debouncer stopped");
    }
}
