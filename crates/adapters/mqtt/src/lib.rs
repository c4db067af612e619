//! # gpiobridge-adapter-mqtt
//!
//! MQTT adapter: announces ports to a Home Assistant style automation hub
//! and relays commands back into the bridge.
//!
//! ## Responsibilities
//! - Connect to the broker (rumqttc, automatic reconnection on poll)
//! - Publish retained discovery documents and retract them on shutdown
//! - Publish port state
//! - Subscribe to command topics of outputs and forward every message as a
//!   [`Command`](gpiobridge_domain::event::Command)
//!
//! ## Dependency rule
//! Same as other adapters: depends on `gpiobridge-app` and `gpiobridge-domain`.

pub mod config;
pub mod error;
mod event_loop;
mod gateway;

use rumqttc::{AsyncClient, MqttOptions};
use tokio::sync::mpsc;
use tracing::info;

use gpiobridge_domain::error::ConfigError;
use gpiobridge_domain::event::Command;
use gpiobridge_domain::system::SystemConfig;

pub use config::MqttConfig;
pub use error::MqttError;
pub use event_loop::MqttEventLoop;
pub use gateway::{MqttGateway, map_qos};

/// Build the gateway and the event loop that drives it.
///
/// Nothing reaches the broker until [`MqttEventLoop::run`] is polled, so the
/// event loop is usually spawned before the gateway is used.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBrokerUrl`] if the broker address in
/// `config` cannot be parsed.
pub fn connect(
    config: &MqttConfig,
    system: SystemConfig,
    commands: mpsc::UnboundedSender<Command>,
) -> Result<(MqttGateway, MqttEventLoop), ConfigError> {
    let (host, port) = config.broker()?;
    let client_id = config.client_id_for(&system.node_id);
    info!(host = %host, port, client_id = %client_id, "connecting to broker");

    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(config.keep_alive());
    let (client, event_loop) = AsyncClient::new(options, config.capacity);

    let qos = map_qos(system.qos);
    let subscriptions = gateway::Subscriptions::default();
    let gateway = MqttGateway::new(client.clone(), system, subscriptions.clone());
    let event_loop = MqttEventLoop::new(
        event_loop,
        client,
        qos,
        subscriptions,
        commands,
        config.reconnect_delay(),
    );
    Ok((gateway, event_loop))
}
