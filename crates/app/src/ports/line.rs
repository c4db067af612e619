//! Line driver port: exclusive access to hardware lines.

use tokio::sync::mpsc;

use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::event::RawTransition;
use gpiobridge_domain::port::{PortSpec, PortState};

/// Claims hardware lines.
///
/// Every successful claim hands out the one and only handle for that line;
/// the registry owns it until shutdown.
pub trait LineDriver {
    type Handle: LineHandle;

    /// Claim `spec.line` as an input and start watching it.
    ///
    /// Each level change must be sent on `transitions` until the handle is
    /// released. Watchers of different lines must not share mutable state.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Hardware`] when the line cannot be claimed or
    /// watched. This is fatal at startup.
    fn claim_input(
        &mut self,
        spec: &PortSpec,
        transitions: mpsc::UnboundedSender<RawTransition>,
    ) -> Result<Self::Handle, BridgeError>;

    /// Claim `spec.line` as an output, initially driven low.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Hardware`] when the line cannot be claimed.
    fn claim_output(&mut self, spec: &PortSpec) -> Result<Self::Handle, BridgeError>;
}

/// Exclusive handle on a claimed line.
pub trait LineHandle: Send {
    /// Read the current level.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Hardware`] if the line cannot be read.
    fn read(&self) -> Result<PortState, BridgeError>;

    /// Drive the line to `state`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Hardware`] if the line is not an output or the
    /// write fails.
    fn drive(&mut self, state: PortState) -> Result<(), BridgeError>;

    /// Stop watching and give the line back. Consumes the handle.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Hardware`] if the release fails.
    fn release(self) -> Result<(), BridgeError>
    where
        Self: Sized;
}
