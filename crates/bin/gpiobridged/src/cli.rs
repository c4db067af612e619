//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use gpiobridge_domain::port::PortSpec;

const PORTS_HELP: &str = "\
Port kinds:
  i, in, binary_sensor    input, published as a binary sensor
  o, out, switch          output, published as a switch and commandable

Example:
  gpiobridged -p 12:o:lights,18:i:some_button";

/// Expose GPIO lines to a Home Assistant compatible MQTT broker.
///
/// Options left unset fall back to the environment, then to the
/// configuration file, then to built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "gpiobridged", version, about, after_help = PORTS_HELP)]
pub struct Args {
    /// MQTT broker, e.g. tcp://localhost:1883 [default: tcp://localhost:1883]
    #[arg(short = 'm', long = "mqtt", value_name = "URL")]
    pub mqtt: Option<String>,

    /// Discovery topic prefix [default: homeassistant]
    #[arg(short = 'd', long, value_name = "PREFIX")]
    pub discovery_prefix: Option<String>,

    /// Node identifier used in every topic [default: raspi-gpio]
    #[arg(short = 'n', long = "name", value_name = "NODE_ID")]
    pub node_id: Option<String>,

    /// MQTT QoS level, 0, 1 or 2 [default: 1]
    #[arg(short = 'q', long, value_name = "QOS")]
    pub qos: Option<u8>,

    /// Ports as line:kind:name, repeatable and comma separated
    #[arg(short = 'p', long = "ports", value_name = "SPEC", value_delimiter = ',')]
    pub ports: Vec<PortSpec>,

    /// Configuration file, ignored when missing
    #[arg(short = 'c', long, value_name = "PATH", default_value = "gpiobridge.toml")]
    pub config: PathBuf,

    /// Use in-memory lines instead of the GPIO chip
    #[arg(long = "virtual")]
    pub virtual_lines: bool,

    /// Tracing filter, overrides RUST_LOG and the configuration file
    #[arg(long, value_name = "FILTER")]
    pub log: Option<String>,
}
