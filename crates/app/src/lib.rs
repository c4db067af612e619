//! # gpiobridge-app
//!
//! Application layer: the event-arbitration pipeline and **port definitions**
//! (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `BrokerGateway`: advertise, retract and publish port state
//!   - `LineDriver` / `LineHandle`: claim, read, drive and release lines
//! - Hold the **port registry**, the single table of port state
//! - **Debounce** raw line transitions into stable events
//! - Run the **dispatch loop**, the only writer of port state
//! - **Bootstrap** the whole pipeline from validated port specifications
//!
//! ## Dependency rule
//! Depends on `gpiobridge-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bridge;
pub mod debouncer;
pub mod dispatcher;
pub mod ports;
pub mod registry;

#[cfg(test)]
mod testing;
