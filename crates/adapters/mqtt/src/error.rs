//! MQTT adapter error types.

use gpiobridge_domain::error::BridgeError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client refused the request (event loop gone or queue closed).
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The discovery payload could not be encoded.
    #[error("failed to encode discovery payload")]
    Encode(#[source] serde_json::Error),
}

impl From<rumqttc::ClientError> for MqttError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Client(err)
    }
}

impl From<MqttError> for BridgeError {
    fn from(err: MqttError) -> Self {
        BridgeError::Gateway(Box::new(err))
    }
}
