//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`BridgeError`]
//! via `#[from]` (or an explicit `From` impl for boxed adapter errors).

use crate::line::LineId;

/// Boxed source error coming from an adapter (hardware, transport).
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("protocol violation")]
    Protocol(#[from] ProtocolError),

    /// A broken internal invariant; the port table can no longer be trusted.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("hardware error")]
    Hardware(#[source] BoxedError),

    #[error("broker gateway error")]
    Gateway(#[source] BoxedError),

    /// One of the event sources feeding the dispatch loop went away.
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),
}

/// Invalid configuration, detected before anything is claimed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("line {0} is declared more than once")]
    DuplicateLine(LineId),

    #[error("invalid line number {0:?}")]
    InvalidLine(String),

    #[error("unknown port kind {0:?}")]
    UnknownKind(String),

    #[error("malformed port specification {0:?}, expected line:kind:name")]
    MalformedPortSpec(String),

    #[error("port name must not be empty")]
    EmptyName,

    #[error("invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),

    #[error("invalid broker address {0:?}")]
    InvalidBrokerUrl(String),
}

/// An inbound command that does not fit the port table or the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("topic {0:?} is not a command topic of this node")]
    MalformedTopic(String),

    #[error("no port registered on line {0}")]
    UnknownLine(LineId),

    #[error("line {0} is an input and cannot be commanded")]
    NotAnOutput(LineId),

    #[error("unsupported payload {0:?}, expected \"ON\" or \"OFF\"")]
    UnknownPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_duplicate_line_with_offending_value() {
        let err = ConfigError::DuplicateLine(LineId::new(18));
        assert_eq!(err.to_string(), "line 18 is declared more than once");
    }

    #[test]
    fn should_display_unknown_payload_with_offending_value() {
        let err = ProtocolError::UnknownPayload("TOGGLE".to_string());
        assert_eq!(
            err.to_string(),
            "unsupported payload \"TOGGLE\", expected \"ON\" or \"OFF\""
        );
    }

    #[test]
    fn should_convert_config_error_into_bridge_error() {
        let err: BridgeError = ConfigError::EmptyName.into();
        assert!(matches!(err, BridgeError::Config(ConfigError::EmptyName)));
    }

    #[test]
    fn should_convert_protocol_error_into_bridge_error() {
        let err: BridgeError = ProtocolError::NotAnOutput(LineId::new(12)).into();
        assert!(matches!(
            err,
            BridgeError::Protocol(ProtocolError::NotAnOutput(_))
        ));
    }

    #[test]
    fn should_name_closed_channel() {
        let err = BridgeError::ChannelClosed("command");
        assert_eq!(err.to_string(), "command channel closed");
    }
}
