//! Broker gateway port: how ports are announced to and observed by the hub.

use std::future::Future;

use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::port::Port;

/// Publish side of the broker connection.
///
/// Inbound commands travel the other way, through the
/// [`Command`](gpiobridge_domain::event::Command) channel handed to the
/// gateway by the composition root.
pub trait BrokerGateway: Send + Sync {
    /// Publish the retained discovery payload for `port`.
    ///
    /// For outputs, also subscribe to the command topic so that commands are
    /// forwarded to the dispatch loop.
    fn advertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Retract the discovery payload by publishing an empty retained message.
    fn unadvertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Publish the current state of `port` (`"ON"` / `"OFF"`).
    fn publish_state(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: BrokerGateway> BrokerGateway for std::sync::Arc<T> {
    fn advertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).advertise(port)
    }

    fn unadvertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).unadvertise(port)
    }

    fn publish_state(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).publish_state(port)
    }
}
