//! Port registry: the single table of port state, keyed by line.
//!
//! The registry owns every port together with its hardware handle. Mutation
//! goes through `&mut self`, and only the dispatcher holds the registry once
//! the bridge is running, so no lock is needed.

use std::collections::BTreeMap;

use gpiobridge_domain::error::{BridgeError, ConfigError, ProtocolError};
use gpiobridge_domain::line::LineId;
use gpiobridge_domain::port::{Port, PortState};

use crate::ports::LineHandle;

struct Slot<H> {
    port: Port,
    handle: H,
}

/// Mapping from line to port and its exclusively owned handle.
pub struct Registry<H> {
    slots: BTreeMap<LineId, Slot<H>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }
}

impl<H: LineHandle> Registry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `port` with the handle it owns.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateLine`] if the line is taken; the
    /// rejected handle is dropped.
    pub fn register(&mut self, port: Port, handle: H) -> Result<&Port, ConfigError> {
        match self.slots.entry(port.line) {
            std::collections::btree_map::Entry::Occupied(_) => {
                Err(ConfigError::DuplicateLine(port.line))
            }
            std::collections::btree_map::Entry::Vacant(entry) => {
                Ok(&entry.insert(Slot { port, handle }).port)
            }
        }
    }

    /// Look up the port registered on `line`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownLine`] when nothing is registered there.
    pub fn lookup(&self, line: LineId) -> Result<&Port, ProtocolError> {
        self.slots
            .get(&line)
            .map(|slot| &slot.port)
            .ok_or(ProtocolError::UnknownLine(line))
    }

    /// Every registered port, in ascending line order.
    pub fn all(&self) -> impl Iterator<Item = &Port> {
        self.slots.values().map(|slot| &slot.port)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record a new value without touching the hardware (input transitions).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownLine`] when nothing is registered there.
    pub(crate) fn set_state(&mut self, line: LineId, state: PortState) -> Result<&Port, ProtocolError> {
        let slot = self
            .slots
            .get_mut(&line)
            .ok_or(ProtocolError::UnknownLine(line))?;
        slot.port.state = state;
        Ok(&slot.port)
    }

    /// Drive the hardware line, then record the new value.
    ///
    /// The value is only updated once the write succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Protocol`] for an unknown line or an input, and
    /// the handle's error if the write fails.
    pub(crate) fn drive(&mut self, line: LineId, state: PortState) -> Result<&Port, BridgeError> {
        let slot = self
            .slots
            .get_mut(&line)
            .ok_or(ProtocolError::UnknownLine(line))?;
        if !slot.port.is_output() {
            return Err(ProtocolError::NotAnOutput(line).into());
        }
        slot.handle.drive(state)?;
        slot.port.state = state;
        Ok(&slot.port)
    }

    /// Tear the registry down, handing out every port with its handle.
    ///
    /// Consuming the registry guarantees each handle leaves it exactly once.
    #[must_use]
    pub fn shutdown(self) -> Vec<(Port, H)> {
        self.slots
            .into_values()
            .map(|slot| (slot.port, slot.handle))
            .collect()
    }
}
