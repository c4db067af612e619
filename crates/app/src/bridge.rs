//! Bridge bootstrap: claims the lines, announces the ports and wires the
//! debouncer to the dispatch loop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::event::Command;
use gpiobridge_domain::line::LineId;
use gpiobridge_domain::port::{Port, PortKind, PortSpec, PortState};
use gpiobridge_domain::system::{ProtocolPolicy, SystemConfig};

use crate::debouncer::{DEFAULT_QUIET_WINDOW, Debouncer};
use crate::dispatcher::{Dispatcher, ShutdownReport};
use crate::ports::{BrokerGateway, LineDriver, LineHandle};
use crate::registry::Registry;

/// Everything needed to start a bridge.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub system: SystemConfig,
    pub ports: Vec<PortSpec>,
    pub quiet_window: Duration,
    pub policy: ProtocolPolicy,
}

impl BridgeSettings {
    #[must_use]
    pub fn new(system: SystemConfig, ports: Vec<PortSpec>) -> Self {
        Self {
            system,
            ports,
            quiet_window: DEFAULT_QUIET_WINDOW,
            policy: ProtocolPolicy::default(),
        }
    }
}

/// A started bridge: the dispatcher plus the debouncer task feeding it.
pub struct Bridge<G, H> {
    dispatcher: Dispatcher<G, H>,
    debouncer: JoinHandle<()>,
}

impl<G, H> Bridge<G, H>
where
    G: BrokerGateway,
    H: LineHandle,
{
    /// Claim every configured line and announce every port.
    ///
    /// Specs are validated before anything is claimed. If a later step fails,
    /// the lines claimed so far are released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for invalid specs,
    /// [`BridgeError::Hardware`] when a line cannot be claimed or read, and
    /// [`BridgeError::Gateway`] when the broker refuses a publication.
    pub async fn start<D>(
        settings: BridgeSettings,
        driver: &mut D,
        gateway: G,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Result<Self, BridgeError>
    where
        D: LineDriver<Handle = H>,
    {
        PortSpec::validate_all(&settings.ports)?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut registry = Registry::new();
        let mut levels = Vec::new();
        for spec in &settings.ports {
            let claimed = match spec.kind {
                PortKind::Input => driver
                    .claim_input(spec, raw_tx.clone())
                    .and_then(|handle| match handle.read() {
                        Ok(level) => Ok((handle, level)),
                        Err(err) => {
                            release(spec.line, handle);
                            Err(err)
                        }
                    }),
                PortKind::Output => driver
                    .claim_output(spec)
                    .map(|handle| (handle, PortState::Off)),
            };
            let (handle, level) = match claimed {
                Ok(claimed) => claimed,
                Err(err) => {
                    error!(line = %spec.line, name = %spec.name, error = %err, "unable to claim line");
                    release_all(registry);
                    return Err(err);
                }
            };
            debug!(line = %spec.line, kind = ?spec.kind, state = %level, "line claimed");
            if spec.kind == PortKind::Input {
                levels.push((spec.line, level));
            }
            if let Err(err) = registry.register(Port::new(spec, level), handle) {
                release_all(registry);
                return Err(err.into());
            }
        }
        // Only the watchers keep the raw stream open from here on.
        drop(raw_tx);

        if let Err(err) = announce(&gateway, &registry).await {
            release_all(registry);
            return Err(err);
        }

        let (debounced_tx, debounced_rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(settings.quiet_window).with_stable(levels);
        let debouncer = tokio::spawn(debouncer.run(raw_rx, debounced_tx));

        info!(
            node_id = %settings.system.node_id,
            ports = registry.len(),
            "bridge ready"
        );
        let dispatcher = Dispatcher::new(settings.system, registry, gateway, debounced_rx, commands)
            .with_policy(settings.policy);
        Ok(Self {
            dispatcher,
            debouncer,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<G, H> {
        &self.dispatcher
    }

    /// Run the dispatch loop until `shutdown` resolves or a fatal error.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::run`].
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<ShutdownReport, BridgeError> {
        let result = self.dispatcher.run(shutdown).await;
        self.debouncer.abort();
        result
    }
}

/// Advertise every port, then publish every initial state.
async fn announce<G, H>(gateway: &G, registry: &Registry<H>) -> Result<(), BridgeError>
where
    G: BrokerGateway,
    H: LineHandle,
{
    for port in registry.all() {
        info!(line = %port.line, kind = ?port.kind, name = %port.name, "advertising port");
        gateway.advertise(port).await?;
    }
    for port in registry.all() {
        gateway.publish_state(port).await?;
    }
    Ok(())
}

fn release_all<H: LineHandle>(registry: Registry<H>) {
    for (port, handle) in registry.shutdown() {
        release(port.line, handle);
    }
}

fn release<H: LineHandle>(line: LineId, handle: H) {
    if let Err(err) = handle.release() {
        error!(line = %line, error = %err, "failed to release line");
    }
}
