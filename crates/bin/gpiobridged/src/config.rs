//! Configuration loading: TOML file, then environment variables, then
//! command-line flags.
//!
//! Every field has a sensible default so the file is optional. Ports declared
//! on the command line are appended to the ones declared in the file; the
//! combined list is validated as a whole.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use gpiobridge_adapter_mqtt::MqttConfig;
use gpiobridge_app::bridge::BridgeSettings;
use gpiobridge_app::debouncer::DEFAULT_QUIET_WINDOW;
use gpiobridge_domain::port::PortSpec;
use gpiobridge_domain::system::{ProtocolPolicy, Qos, SystemConfig};

use crate::cli::Args;

/// Filter used when neither flags, environment nor file set one.
pub const DEFAULT_LOG_FILTER: &str = "gpiobridged=info,gpiobridge=info";

/// Longest accepted quiet window, in milliseconds.
pub const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node identity and topic scheme.
    pub node: SystemConfig,
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Pipeline tuning.
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
    /// Declared ports, `[[ports]]` tables.
    pub ports: Vec<PortSpec>,
}

/// Pipeline settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Debounce quiet window in milliseconds.
    pub debounce_ms: u64,
    /// What to do with commands that violate the protocol.
    pub on_protocol_violation: ProtocolPolicy,
    /// Use in-memory lines instead of the GPIO chip.
    #[serde(rename = "virtual")]
    pub virtual_lines: bool,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: u64::try_from(DEFAULT_QUIET_WINDOW.as_millis()).unwrap_or(50),
            on_protocol_violation: ProtocolPolicy::default(),
            virtual_lines: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load the file named by `args` (if present), apply environment
    /// overrides, then the flags, and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the merged configuration is invalid.
    pub fn load(args: &Args) -> Result<Self, ConfigLoadError> {
        let mut config = Self::from_file(&args.config)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.apply_args(args)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigLoadError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(ConfigLoadError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("GPIOBRIDGE_MQTT") {
            self.mqtt.url = val;
        }
        if let Some(val) = var("GPIOBRIDGE_NODE_ID") {
            self.node.node_id = val;
        }
        if let Some(val) = var("GPIOBRIDGE_DISCOVERY_PREFIX") {
            self.node.discovery_prefix = val;
        }
        if let Some(val) = var("GPIOBRIDGE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn apply_args(&mut self, args: &Args) -> Result<(), ConfigLoadError> {
        if let Some(url) = &args.mqtt {
            self.mqtt.url.clone_from(url);
        }
        if let Some(prefix) = &args.discovery_prefix {
            self.node.discovery_prefix.clone_from(prefix);
        }
        if let Some(node_id) = &args.node_id {
            self.node.node_id.clone_from(node_id);
        }
        if let Some(level) = args.qos {
            self.node.qos = Qos::try_from(level)?;
        }
        if let Some(filter) = &args.log {
            self.logging.filter.clone_from(filter);
        }
        if args.virtual_lines {
            self.bridge.virtual_lines = true;
        }
        self.ports.extend(args.ports.iter().cloned());
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        self.mqtt.broker()?;
        PortSpec::validate_all(&self.ports)?;
        if self.node.node_id.is_empty() || self.node.node_id.contains(['/', '+', '#']) {
            return Err(ConfigLoadError::Validation(format!(
                "node id {:?} is not usable in a topic",
                self.node.node_id
            )));
        }
        if self.node.discovery_prefix.is_empty() {
            return Err(ConfigLoadError::Validation(
                "discovery prefix must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_DEBOUNCE_MS).contains(&self.bridge.debounce_ms) {
            return Err(ConfigLoadError::Validation(format!(
                "debounce_ms must be between 1 and {MAX_DEBOUNCE_MS}, got {}",
                self.bridge.debounce_ms
            )));
        }
        Ok(())
    }

    /// Settings handed to the bridge bootstrap.
    #[must_use]
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            system: self.node.clone(),
            ports: self.ports.clone(),
            quiet_window: Duration::from_millis(self.bridge.debounce_ms),
            policy: self.bridge.on_protocol_violation,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// A value that does not make sense on its own.
    #[error("invalid configuration")]
    Invalid(#[from] gpiobridge_domain::error::ConfigError),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
