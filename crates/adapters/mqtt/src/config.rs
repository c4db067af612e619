//! MQTT connection configuration.

use std::time::Duration;

use serde::Deserialize;

use gpiobridge_domain::error::ConfigError;

/// Port used when the broker address does not name one.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Configuration for the broker connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker address: `tcp://host:port`, `mqtt://host:port` or `host[:port]`.
    pub url: String,
    /// MQTT client identifier. Derived from the node id when unset.
    pub client_id: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Capacity of the outgoing request queue.
    pub capacity: usize,
    /// Pause before polling again after a connection error, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// How long shutdown waits for retractions to reach the broker, in
    /// milliseconds.
    pub flush_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: "tcp://localhost:1883".to_string(),
            client_id: None,
            keep_alive_secs: 5,
            capacity: 64,
            reconnect_delay_ms: 2_000,
            flush_timeout_ms: 1_000,
        }
    }
}

impl MqttConfig {
    /// Host and port of the broker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBrokerUrl`] if the address cannot be
    /// understood.
    pub fn broker(&self) -> Result<(String, u16), ConfigError> {
        parse_broker_url(&self.url)
    }

    /// Client identifier announced to the broker.
    #[must_use]
    pub fn client_id_for(&self, node_id: &str) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("gpiobridge-{node_id}"))
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Split a broker address into host and port.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBrokerUrl`] for an unsupported scheme, an
/// empty host or a port that is not a non-zero `u16`.
pub fn parse_broker_url(url: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidBrokerUrl(url.to_string());
    let address = match url.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => url,
    };
    let address = address.strip_suffix('/').unwrap_or(address);
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            (host, port)
        }
        None => (address, DEFAULT_BROKER_PORT),
    };
    if host.is_empty() || port == 0 || host.contains(['/', ' ']) {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}
