//! GPIO adapter error types.

use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::line::LineId;

/// Errors specific to the rppal adapter.
#[derive(Debug, thiserror::Error)]
pub enum RppalError {
    /// The GPIO peripheral could not be opened or a pin operation failed.
    #[error("GPIO error")]
    Gpio(#[from] rppal::gpio::Error),

    /// The line number does not fit a BCM pin number.
    #[error("line {0} is out of range for this GPIO chip")]
    LineOutOfRange(LineId),
}

impl From<RppalError> for BridgeError {
    fn from(err: RppalError) -> Self {
        BridgeError::Hardware(Box::new(err))
    }
}
