//! Port: a named binary input or output bound to exactly one line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProtocolError};
use crate::line::LineId;

/// Whether a port is observed only, or observed and actuable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    #[serde(alias = "i", alias = "in", alias = "binary_sensor")]
    Input,
    #[serde(alias = "o", alias = "out", alias = "switch")]
    Output,
}

impl PortKind {
    /// Hub-facing discovery component for this kind.
    #[must_use]
    pub fn component(self) -> &'static str {
        match self {
            Self::Input => "binary_sensor",
            Self::Output => "switch",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

impl FromStr for PortKind {
    type Err = ConfigError;

    /// Accepts the command-line aliases: `i`, `in`, `binary_sensor` for
    /// inputs and `o`, `out`, `switch` for outputs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i" | "in" | "binary_sensor" => Ok(Self::Input),
            "o" | "out" | "switch" => Ok(Self::Output),
            other => Err(ConfigError::UnknownKind(other.to_string())),
        }
    }
}

/// Binary value of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    #[default]
    Off,
    On,
}

impl PortState {
    pub const ON_PAYLOAD: &'static str = "ON";
    pub const OFF_PAYLOAD: &'static str = "OFF";

    /// Payload published on the state topic.
    #[must_use]
    pub fn encode(self) -> &'static str {
        match self {
            Self::On => Self::ON_PAYLOAD,
            Self::Off => Self::OFF_PAYLOAD,
        }
    }

    /// Decode a command payload. Only the two exact literals are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownPayload`] for anything else.
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        match payload {
            Self::ON_PAYLOAD => Ok(Self::On),
            Self::OFF_PAYLOAD => Ok(Self::Off),
            other => Err(ProtocolError::UnknownPayload(other.to_string())),
        }
    }

    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for PortState {
    fn from(high: bool) -> Self {
        if high { Self::On } else { Self::Off }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Input bias resistor requested for an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

/// Declarative description of one port, as read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub line: LineId,
    pub kind: PortKind,
    pub name: String,
    #[serde(default)]
    pub pull: Pull,
}

impl PortSpec {
    /// Build a spec, rejecting empty names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyName`] when `name` is blank.
    pub fn new(line: LineId, kind: PortKind, name: impl Into<String>) -> Result<Self, ConfigError> {
        let spec = Self {
            line,
            kind,
            name: name.into(),
            pull: Pull::None,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the invariants of a single spec.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyName`] when `name` is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }

    /// Check every spec and the uniqueness of lines across the whole set.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, [`ConfigError::DuplicateLine`]
    /// naming the first line declared twice.
    pub fn validate_all(specs: &[Self]) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::with_capacity(specs.len());
        for spec in specs {
            spec.validate()?;
            if !seen.insert(spec.line) {
                return Err(ConfigError::DuplicateLine(spec.line));
            }
        }
        Ok(())
    }
}

impl FromStr for PortSpec {
    type Err = ConfigError;

    /// Parse `line:kind:name`. The name may itself contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(line), Some(kind), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::MalformedPortSpec(s.to_string()));
        };
        Self::new(line.parse()?, kind.parse()?, name)
    }
}

/// A registered port and its current value.
///
/// The value is only ever changed by the dispatch loop; everything else
/// here is fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub line: LineId,
    pub kind: PortKind,
    pub name: String,
    pub state: PortState,
}

impl Port {
    #[must_use]
    pub fn new(spec: &PortSpec, state: PortState) -> Self {
        Self {
            line: spec.line,
            kind: spec.kind,
            name: spec.name.clone(),
            state,
        }
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        self.kind == PortKind::Output
    }
}
