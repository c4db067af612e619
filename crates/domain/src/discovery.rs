//! Discovery payload: the retained JSON document advertising a port to the
//! automation hub.

use serde::{Deserialize, Serialize};

use crate::port::Port;
use crate::system::SystemConfig;

/// Body published on a port's config topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub state_topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
}

impl DiscoveryPayload {
    /// Describe `port`; only outputs get a command topic.
    #[must_use]
    pub fn for_port(system: &SystemConfig, port: &Port) -> Self {
        Self {
            name: port.name.clone(),
            state_topic: system.state_topic(port),
            command_topic: port.is_output().then(|| system.command_topic(port)),
        }
    }

    /// Serialize to the wire representation.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error (not expected for this shape).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortSpec, PortState};

    fn port(spec: &str) -> Port {
        Port::new(&spec.parse::<PortSpec>().unwrap(), PortState::Off)
    }

    #[test]
    fn should_include_command_topic_for_output() {
        let sys = SystemConfig::default();
        let json = DiscoveryPayload::for_port(&sys, &port("18:o:lights"))
            .to_json()
            .unwrap();
        assert_eq!(
            json,
            r#"{"name":"lights","state_topic":"homeassistant/switch/raspi-gpio/18/state","command_topic":"homeassistant/switch/raspi-gpio/18/set"}"#
        );
    }

    #[test]
    fn should_omit_command_topic_for_input() {
        let sys = SystemConfig::default();
        let json = DiscoveryPayload::for_port(&sys, &port("12:i:button"))
            .to_json()
            .unwrap();
        assert_eq!(
            json,
            r#"{"name":"button","state_topic":"homeassistant/binary_sensor/raspi-gpio/12/state"}"#
        );
    }

    #[test]
    fn should_produce_identical_payload_for_same_port() {
        let sys = SystemConfig::default();
        let lights = port("18:o:lights");
        let first = DiscoveryPayload::for_port(&sys, &lights).to_json().unwrap();
        let second = DiscoveryPayload::for_port(&sys, &lights).to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn should_not_depend_on_current_state() {
        let sys = SystemConfig::default();
        let mut lights = port("18:o:lights");
        let off = DiscoveryPayload::for_port(&sys, &lights);
        lights.state = PortState::On;
        assert_eq!(off, DiscoveryPayload::for_port(&sys, &lights));
    }
}
