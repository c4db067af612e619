//! # gpiobridge-adapter-virtual
//!
//! In-memory GPIO chip used by `gpiobridged --virtual` and by end-to-end
//! tests.
//!
//! A [`VirtualChip`] is a cheap clone over shared state: the bridge claims
//! lines through one clone while a test (or the demo) keeps another to flip
//! input levels with [`VirtualChip::set_level`] and observe outputs with
//! [`VirtualChip::level`].
//!
//! ## Dependency rule
//!
//! Depends on `gpiobridge-app` (port traits) and `gpiobridge-domain` only.

pub mod error;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use gpiobridge_app::ports::{LineDriver, LineHandle};
use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::event::RawTransition;
use gpiobridge_domain::line::LineId;
use gpiobridge_domain::port::{PortKind, PortSpec, PortState};

pub use error::VirtualError;

struct Claim {
    kind: PortKind,
    watcher: Option<mpsc::UnboundedSender<RawTransition>>,
}

#[derive(Default)]
struct Chip {
    levels: HashMap<LineId, PortState>,
    claims: HashMap<LineId, Claim>,
    unavailable: BTreeSet<LineId>,
}

/// Shared in-memory GPIO chip.
#[derive(Clone, Default)]
pub struct VirtualChip {
    chip: Arc<Mutex<Chip>>,
}

impl VirtualChip {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset the level of a line before it is claimed.
    #[must_use]
    pub fn with_level(self, line: LineId, state: PortState) -> Self {
        self.lock().levels.insert(line, state);
        self
    }

    /// Make every claim of `line` fail, like a line held by another process.
    #[must_use]
    pub fn with_unavailable(self, line: LineId) -> Self {
        self.lock().unavailable.insert(line);
        self
    }

    /// Current level of `line`, if it was ever set or claimed.
    #[must_use]
    pub fn level(&self, line: LineId) -> Option<PortState> {
        self.lock().levels.get(&line).copied()
    }

    #[must_use]
    pub fn is_claimed(&self, line: LineId) -> bool {
        self.lock().claims.contains_key(&line)
    }

    /// Set the level seen on `line` from the outside world.
    ///
    /// When the level changes on a watched input, a raw transition is sent
    /// to its watcher. Returns whether the level changed.
    pub fn set_level(&self, line: LineId, state: PortState) -> bool {
        let mut chip = self.lock();
        let previous = chip.levels.insert(line, state);
        if previous == Some(state) {
            return false;
        }
        if let Some(watcher) = chip.claims.get(&line).and_then(|c| c.watcher.as_ref()) {
            trace!(line = %line, state = %state, "virtual edge");
            // A closed watcher means the bridge is shutting down.
            let _ = watcher.send(RawTransition::now(line, state));
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Chip> {
        self.chip.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(
        &self,
        spec: &PortSpec,
        watcher: Option<mpsc::UnboundedSender<RawTransition>>,
    ) -> Result<VirtualLine, VirtualError> {
        let mut chip = self.lock();
        if chip.unavailable.contains(&spec.line) {
            return Err(VirtualError::Unavailable(spec.line));
        }
        if chip.claims.contains_key(&spec.line) {
            return Err(VirtualError::Busy(spec.line));
        }
        if spec.kind == PortKind::Output {
            chip.levels.insert(spec.line, PortState::Off);
        }
        chip.claims.insert(
            spec.line,
            Claim {
                kind: spec.kind,
                watcher,
            },
        );
        debug!(line = %spec.line, kind = ?spec.kind, "virtual line claimed");
        Ok(VirtualLine {
            line: spec.line,
            chip: self.clone(),
        })
    }
}

impl LineDriver for VirtualChip {
    type Handle = VirtualLine;

    fn claim_input(
        &mut self,
        spec: &PortSpec,
        transitions: mpsc::UnboundedSender<RawTransition>,
    ) -> Result<VirtualLine, BridgeError> {
        Ok(self.claim(spec, Some(transitions))?)
    }

    fn claim_output(&mut self, spec: &PortSpec) -> Result<VirtualLine, BridgeError> {
        Ok(self.claim(spec, None)?)
    }
}

/// Handle on a claimed virtual line.
pub struct VirtualLine {
    line: LineId,
    chip: VirtualChip,
}

impl LineHandle for VirtualLine {
    fn read(&self) -> Result<PortState, BridgeError> {
        Ok(self.chip.level(self.line).unwrap_or_default())
    }

    fn drive(&mut self, state: PortState) -> Result<(), BridgeError> {
        let mut chip = self.chip.lock();
        let is_output = chip
            .claims
            .get(&self.line)
            .is_some_and(|claim| claim.kind == PortKind::Output);
        if !is_output {
            return Err(VirtualError::NotAnOutput(self.line).into());
        }
        chip.levels.insert(self.line, state);
        Ok(())
    }

    fn release(self) -> Result<(), BridgeError> {
        self.chip.lock().claims.remove(&self.line);
        debug!(line = %self.line, "virtual line released");
        Ok(())
    }
}
