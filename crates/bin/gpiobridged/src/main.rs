//! # gpiobridged: GPIO to MQTT bridge daemon
//!
//! Composition root that wires the line driver, the bridge pipeline and the
//! MQTT gateway together.
//!
//! ## Responsibilities
//! - Parse configuration (CLI flags, env vars, config file)
//! - Install the tracing subscriber
//! - Connect to the broker and spawn its event loop
//! - Claim the lines (real GPIO or virtual) and start the bridge
//! - Handle graceful shutdown (SIGTERM/SIGINT), flushing retractions
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer, no domain logic belongs here.

mod cli;
mod config;

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gpiobridge_adapter_mqtt::MqttGateway;
use gpiobridge_adapter_rppal::RppalDriver;
use gpiobridge_adapter_virtual::VirtualChip;
use gpiobridge_app::bridge::{Bridge, BridgeSettings};
use gpiobridge_app::dispatcher::ShutdownReport;
use gpiobridge_app::ports::LineDriver;
use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::event::Command;

use crate::cli::Args;
use crate::config::{Config, DEFAULT_LOG_FILTER};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::load(&args);

    let filter = config
        .as_ref()
        .map_or(DEFAULT_LOG_FILTER, |config| config.logging.filter.as_str());
    init_tracing(filter);

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(path = %args.config.display(), error = %describe(&err), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(report) => {
            info!(
                retracted = report.retracted,
                released = report.released,
                "shutdown complete"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %describe(&err), "bridge stopped");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {filter:?} ({err}), using {DEFAULT_LOG_FILTER:?}");
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Render an error with its whole source chain.
fn describe(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

async fn run(config: Config) -> Result<ShutdownReport, BridgeError> {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (gateway, event_loop) =
        gpiobridge_adapter_mqtt::connect(&config.mqtt, config.node.clone(), commands_tx)?;
    let mut broker = tokio::spawn(event_loop.run());

    let settings = config.bridge_settings();
    let result = if config.bridge.virtual_lines {
        info!("using virtual lines");
        let mut chip = VirtualChip::new();
        serve(settings, &mut chip, gateway.clone(), commands_rx).await
    } else {
        match RppalDriver::new() {
            Ok(mut driver) => serve(settings, &mut driver, gateway.clone(), commands_rx).await,
            Err(err) => Err(err.into()),
        }
    };

    // Let queued retractions reach the broker before leaving.
    if let Err(err) = gateway.disconnect().await {
        warn!(error = %describe(&err), "unable to disconnect from broker");
    }
    if tokio::time::timeout(config.mqtt.flush_timeout(), &mut broker)
        .await
        .is_err()
    {
        warn!("broker did not acknowledge disconnect in time");
        broker.abort();
    }
    result
}

async fn serve<D: LineDriver>(
    settings: BridgeSettings,
    driver: &mut D,
    gateway: MqttGateway,
    commands: mpsc::UnboundedReceiver<Command>,
) -> Result<ShutdownReport, BridgeError> {
    let bridge = Bridge::start(settings, driver, gateway, commands).await?;
    bridge.run(shutdown_signal()).await
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
