//! # gpiobridge-adapter-rppal
//!
//! Raspberry Pi GPIO through `rppal`.
//!
//! Inputs are watched with an asynchronous interrupt on both edges: rppal
//! runs the callback on its own thread, which only forwards a
//! [`RawTransition`] on the channel handed over at claim time. Outputs are
//! claimed driven low. Dropping a pin resets it, so releasing a handle gives
//! the line back in its original mode.
//!
//! ## Dependency rule
//! Same as other adapters: depends on `gpiobridge-app` and `gpiobridge-domain`.

pub mod error;

use rppal::gpio::{Event, Gpio, InputPin, Level, OutputPin, Trigger};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use gpiobridge_app::ports::{LineDriver, LineHandle};
use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::event::RawTransition;
use gpiobridge_domain::line::LineId;
use gpiobridge_domain::port::{PortSpec, PortState, Pull};

pub use error::RppalError;

fn level_to_state(level: Level) -> PortState {
    match level {
        Level::High => PortState::On,
        Level::Low => PortState::Off,
    }
}

fn state_to_level(state: PortState) -> Level {
    if state.is_on() { Level::High } else { Level::Low }
}

/// Level reached after an interrupt edge.
fn trigger_to_state(trigger: Trigger) -> Option<PortState> {
    match trigger {
        Trigger::RisingEdge => Some(PortState::On),
        Trigger::FallingEdge => Some(PortState::Off),
        _ => None,
    }
}

fn pin_number(line: LineId) -> Result<u8, RppalError> {
    u8::try_from(line.get()).map_err(|_| RppalError::LineOutOfRange(line))
}

/// Hands out exclusive handles on the lines of the local GPIO chip.
pub struct RppalDriver {
    gpio: Gpio,
}

impl RppalDriver {
    /// Open the GPIO peripheral.
    ///
    /// # Errors
    ///
    /// Returns [`RppalError::Gpio`] when the peripheral is not available
    /// (not a Raspberry Pi, or missing permissions on `/dev/gpiomem`).
    pub fn new() -> Result<Self, RppalError> {
        Ok(Self { gpio: Gpio::new()? })
    }

    fn claim_input_pin(&self, spec: &PortSpec) -> Result<InputPin, RppalError> {
        let pin = self.gpio.get(pin_number(spec.line)?)?;
        Ok(match spec.pull {
            Pull::None => pin.into_input(),
            Pull::Up => pin.into_input_pullup(),
            Pull::Down => pin.into_input_pulldown(),
        })
    }
}

impl LineDriver for RppalDriver {
    type Handle = RppalLine;

    fn claim_input(
        &mut self,
        spec: &PortSpec,
        transitions: mpsc::UnboundedSender<RawTransition>,
    ) -> Result<RppalLine, BridgeError> {
        let mut pin = self.claim_input_pin(spec)?;
        let line = spec.line;
        pin.set_async_interrupt(Trigger::Both, None, move |event: Event| {
            let Some(state) = trigger_to_state(event.trigger) else {
                return;
            };
            trace!(line = %line, state = %state, "edge");
            // The receiver only goes away at shutdown, when this pin is reset.
            let _ = transitions.send(RawTransition::now(line, state));
        })
        .map_err(RppalError::from)?;
        debug!(line = %line, pull = ?spec.pull, "input line watched");
        Ok(RppalLine::Input { line, pin })
    }

    fn claim_output(&mut self, spec: &PortSpec) -> Result<RppalLine, BridgeError> {
        let pin = self
            .gpio
            .get(pin_number(spec.line)?)
            .map_err(RppalError::from)?
            .into_output_low();
        debug!(line = %spec.line, "output line claimed");
        Ok(RppalLine::Output {
            line: spec.line,
            pin,
        })
    }
}

/// A claimed BCM pin.
pub enum RppalLine {
    Input { line: LineId, pin: InputPin },
    Output { line: LineId, pin: OutputPin },
}

impl RppalLine {
    #[must_use]
    pub fn line(&self) -> LineId {
        match self {
            Self::Input { line, .. } | Self::Output { line, .. } => *line,
        }
    }
}

impl LineHandle for RppalLine {
    fn read(&self) -> Result<PortState, BridgeError> {
        Ok(match self {
            Self::Input { pin, .. } => level_to_state(pin.read()),
            Self::Output { pin, .. } => PortState::from(pin.is_set_high()),
        })
    }

    fn drive(&mut self, state: PortState) -> Result<(), BridgeError> {
        match self {
            Self::Output { pin, .. } => {
                pin.write(state_to_level(state));
                Ok(())
            }
            Self::Input { line, .. } => Err(BridgeError::Invariant(format!(
                "attempt to drive input line {line}"
            ))),
        }
    }

    fn release(self) -> Result<(), BridgeError> {
        let line = self.line();
        if let Self::Input { mut pin, .. } = self {
            pin.clear_async_interrupt().map_err(RppalError::from)?;
        }
        debug!(line = %line, "line released");
        Ok(())
    }
}
