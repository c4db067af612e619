//! # gpiobridge-domain
//!
//! Pure domain model for the gpiobridge GPIO ⇄ MQTT bridge.
//!
//! ## Responsibilities
//! - Foundational types: line identifiers, error conventions, timestamps
//! - Define **Ports** (a named binary input or output bound to one line)
//! - Define the **System configuration** and the topic scheme derived from it
//! - Define the **Discovery payload** advertised to the automation hub
//! - Define the **Events** flowing through the pipeline (raw transitions,
//!   debounced transitions, inbound commands)
//! - Contain all invariant enforcement (unique lines, accepted payloads, …)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod line;
pub mod time;

pub mod discovery;
pub mod event;
pub mod port;
pub mod system;
