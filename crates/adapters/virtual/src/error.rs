//! Virtual chip error types.

use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::line::LineId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VirtualError {
    #[error("line {0} is already claimed")]
    Busy(LineId),

    #[error("line {0} is not available on this chip")]
    Unavailable(LineId),

    #[error("line {0} is configured as an input")]
    NotAnOutput(LineId),
}

impl From<VirtualError> for BridgeError {
    fn from(err: VirtualError) -> Self {
        BridgeError::Hardware(Box::new(err))
    }
}
