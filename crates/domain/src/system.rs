//! System configuration and the discovery topic scheme derived from it.
//!
//! Every topic has the shape
//! `<discovery_prefix>/<component>/<node_id>/<line>/{config|set|state}`.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProtocolError};
use crate::line::LineId;
use crate::port::{Port, PortKind};

/// MQTT delivery guarantee requested for every publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Qos {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ConfigError::InvalidQos(other)),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }
}

/// What the dispatch loop does with a command that violates the protocol
/// (unknown line, input addressed, unsupported payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolPolicy {
    /// Stop the bridge with a non-zero exit status.
    #[default]
    Fatal,
    /// Log the offending message and keep running.
    Ignore,
}

/// Process-wide settings, immutable once the bridge is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub discovery_prefix: String,
    pub node_id: String,
    pub qos: Qos,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            discovery_prefix: "homeassistant".to_string(),
            node_id: "raspi-gpio".to_string(),
            qos: Qos::default(),
        }
    }
}

impl SystemConfig {
    /// `<prefix>/<component>/<node_id>/<line>`, shared by all topics of a port.
    #[must_use]
    pub fn node_topic(&self, kind: PortKind, line: LineId) -> String {
        format!(
            "{}/{}/{}/{}",
            self.discovery_prefix,
            kind.component(),
            self.node_id,
            line
        )
    }

    /// Retained discovery configuration topic.
    #[must_use]
    pub fn config_topic(&self, port: &Port) -> String {
        format!("{}/config", self.node_topic(port.kind, port.line))
    }

    /// Command topic (only meaningful for outputs).
    #[must_use]
    pub fn command_topic(&self, port: &Port) -> String {
        format!("{}/set", self.node_topic(port.kind, port.line))
    }

    #[must_use]
    pub fn state_topic(&self, port: &Port) -> String {
        format!("{}/state", self.node_topic(port.kind, port.line))
    }

    /// Recover the line addressed by a command topic.
    ///
    /// Only `<prefix>/switch/<node_id>/<line>/set` is accepted; a topic aimed
    /// at another node, another component or another suffix is malformed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedTopic`] when the topic does not match.
    pub fn parse_command_topic(&self, topic: &str) -> Result<LineId, ProtocolError> {
        let malformed = || ProtocolError::MalformedTopic(topic.to_string());
        let base = format!(
            "{}/{}/{}/",
            self.discovery_prefix,
            PortKind::Output.component(),
            self.node_id
        );
        let line = topic
            .strip_prefix(&base)
            .and_then(|rest| rest.strip_suffix("/set"))
            .ok_or_else(malformed)?;
        if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        line.parse().map_err(|_| malformed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortSpec, PortState};

    fn system() -> SystemConfig {
        SystemConfig {
            discovery_prefix: "homeassistant".to_string(),
            node_id: "pi".to_string(),
            qos: Qos::AtLeastOnce,
        }
    }

    fn port(spec: &str) -> Port {
        Port::new(&spec.parse::<PortSpec>().unwrap(), PortState::Off)
    }

    #[test]
    fn should_derive_switch_topics_for_output() {
        let sys = system();
        let lights = port("18:o:lights");
        assert_eq!(sys.config_topic(&lights), "homeassistant/switch/pi/18/config");
        assert_eq!(sys.command_topic(&lights), "homeassistant/switch/pi/18/set");
        assert_eq!(sys.state_topic(&lights), "homeassistant/switch/pi/18/state");
    }

    #[test]
    fn should_derive_binary_sensor_topics_for_input() {
        let sys = system();
        let button = port("12:i:button");
        assert_eq!(
            sys.config_topic(&button),
            "homeassistant/binary_sensor/pi/12/config"
        );
        assert_eq!(
            sys.state_topic(&button),
            "homeassistant/binary_sensor/pi/12/state"
        );
    }

    #[test]
    fn should_parse_line_from_command_topic() {
        let sys = system();
        let line = sys
            .parse_command_topic("homeassistant/switch/pi/18/set")
            .unwrap();
        assert_eq!(line, LineId::new(18));
    }

    #[test]
    fn should_roundtrip_command_topic() {
        let sys = system();
        let lights = port("23:o:fan");
        let line = sys.parse_command_topic(&sys.command_topic(&lights)).unwrap();
        assert_eq!(line, lights.line);
    }

    #[test]
    fn should_support_prefix_containing_slashes() {
        let sys = SystemConfig {
            discovery_prefix: "site/a/ha".to_string(),
            ..system()
        };
        let line = sys.parse_command_topic("site/a/ha/switch/pi/5/set").unwrap();
        assert_eq!(line, LineId::new(5));
    }

    #[test]
    fn should_reject_command_topic_for_other_node() {
        let sys = system();
        let result = sys.parse_command_topic("homeassistant/switch/other/18/set");
        assert!(matches!(result, Err(ProtocolError::MalformedTopic(_))));
    }

    #[test]
    fn should_reject_non_numeric_line_in_topic() {
        let sys = system();
        for topic in [
            "homeassistant/switch/pi/x/set",
            "homeassistant/switch/pi//set",
            "homeassistant/switch/pi/-1/set",
            "homeassistant/switch/pi/1/2/set",
        ] {
            assert!(sys.parse_command_topic(topic).is_err(), "{topic}");
        }
    }

    #[test]
    fn should_reject_state_topic_as_command() {
        let sys = system();
        assert!(
            sys.parse_command_topic("homeassistant/switch/pi/18/state")
                .is_err()
        );
    }

    #[test]
    fn should_convert_qos_levels() {
        assert_eq!(Qos::try_from(0).unwrap(), Qos::AtMostOnce);
        assert_eq!(Qos::try_from(2).unwrap(), Qos::ExactlyOnce);
        assert_eq!(Qos::try_from(3), Err(ConfigError::InvalidQos(3)));
        assert_eq!(u8::from(Qos::AtLeastOnce), 1);
    }

    #[test]
    fn should_default_to_fatal_protocol_policy() {
        assert_eq!(ProtocolPolicy::default(), ProtocolPolicy::Fatal);
    }

    #[test]
    fn should_have_sensible_defaults() {
        let sys = SystemConfig::default();
        assert_eq!(sys.discovery_prefix, "homeassistant");
        assert_eq!(sys.node_id, "raspi-gpio");
        assert_eq!(sys.qos, Qos::AtLeastOnce);
    }
}
