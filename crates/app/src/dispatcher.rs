//! Dispatch loop: the only writer of port state.
//!
//! Three independent sources feed the loop: debounced line events, inbound
//! broker commands, and the termination signal. The loop waits on all three
//! and handles exactly one event to completion before looking at the next,
//! so the registry never sees interleaved mutations.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gpiobridge_domain::error::{BridgeError, ProtocolError};
use gpiobridge_domain::event::{Command, Debounced};
use gpiobridge_domain::port::PortState;
use gpiobridge_domain::system::{ProtocolPolicy, SystemConfig};

use crate::ports::{BrokerGateway, LineHandle};
use crate::registry::Registry;

/// What the shutdown branch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    pub retracted: usize,
    pub released: usize,
}

/// Serialized owner of the port registry.
pub struct Dispatcher<G, H> {
    system: SystemConfig,
    registry: Registry<H>,
    gateway: G,
    policy: ProtocolPolicy,
    debounced: mpsc::UnboundedReceiver<Debounced>,
    commands: mpsc::UnboundedReceiver<Command>,
    line_events_open: bool,
}

impl<G, H> Dispatcher<G, H>
where
    G: BrokerGateway,
    H: LineHandle,
{
    /// Create a dispatcher owning `registry`.
    pub fn new(
        system: SystemConfig,
        registry: Registry<H>,
        gateway: G,
        debounced: mpsc::UnboundedReceiver<Debounced>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            system,
            registry,
            gateway,
            policy: ProtocolPolicy::default(),
            debounced,
            commands,
            line_events_open: true,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ProtocolPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Read-only view of the port table.
    pub fn registry(&self) -> &Registry<H> {
        &self.registry
    }

    fn has_inputs(&self) -> bool {
        self.registry.all().any(|port| !port.is_output())
    }

    /// Apply a stable input transition and publish it.
    ///
    /// # Errors
    ///
    /// An unknown line is an invariant violation: the debouncer only knows
    /// about lines the registry handed out.
    pub async fn handle_debounced(&mut self, event: Debounced) -> Result<(), BridgeError> {
        info!(line = %event.line, state = %event.state, "line event");
        let port = self.registry.set_state(event.line, event.state).map_err(|_| {
            BridgeError::Invariant(format!("debounced event for unregistered line {}", event.line))
        })?;
        self.gateway.publish_state(port).await
    }

    /// Apply an inbound command, following the configured protocol policy.
    ///
    /// # Errors
    ///
    /// Returns the protocol violation under [`ProtocolPolicy::Fatal`], and any
    /// hardware or gateway error regardless of the policy.
    pub async fn handle_command(&mut self, command: Command) -> Result<(), BridgeError> {
        debug!(topic = %command.topic, payload = %command.payload, "command received");
        match self.apply_command(&command).await {
            Err(BridgeError::Protocol(violation)) if self.policy == ProtocolPolicy::Ignore => {
                warn!(
                    topic = %command.topic,
                    payload = %command.payload,
                    error = %violation,
                    "ignoring command"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn apply_command(&mut self, command: &Command) -> Result<(), BridgeError> {
        let line = self.system.parse_command_topic(&command.topic)?;
        let port = self.registry.lookup(line)?;
        if !port.is_output() {
            return Err(ProtocolError::NotAnOutput(line).into());
        }
        let state = PortState::decode(&command.payload)?;
        info!(line = %line, state = %state, "driving output");
        let port = self.registry.drive(line, state)?;
        self.gateway.publish_state(port).await
    }

    /// Retract every port and release every handle, each exactly once.
    ///
    /// All ports are processed even if some fail; the first error is
    /// returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first gateway or hardware error met along the way.
    pub async fn shutdown(self) -> Result<ShutdownReport, BridgeError> {
        info!(ports = self.registry.len(), "shutting down");
        let mut report = ShutdownReport::default();
        let mut first_error = None;
        for (port, handle) in self.registry.shutdown() {
            match self.gateway.unadvertise(&port).await {
                Ok(()) => report.retracted += 1,
                Err(err) => {
                    error!(line = %port.line, error = %err, "failed to retract port");
                    first_error.get_or_insert(err);
                }
            }
            match handle.release() {
                Ok(()) => report.released += 1,
                Err(err) => {
                    error!(line = %port.line, error = %err, "failed to release line");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Run until `shutdown` resolves, then run the shutdown branch once.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: an invariant violation, a protocol
    /// violation under [`ProtocolPolicy::Fatal`], a hardware or gateway
    /// failure, the command stream closing, or the line event stream closing
    /// while inputs are registered.
    pub async fn run(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<ShutdownReport, BridgeError> {
        tokio::pin!(shutdown);
        info!(ports = self.registry.len(), "dispatch loop ready");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("termination signal received");
                    break;
                }
                event = self.debounced.recv(), if self.line_events_open => match event {
                    Some(event) => self.handle_debounced(event).await?,
                    // Watchers hold the raw stream open for as long as inputs
                    // are claimed, so a closed stream with inputs left means
                    // the debouncer died.
                    None if self.has_inputs() => {
                        error!("line event stream closed while inputs are registered");
                        return Err(BridgeError::ChannelClosed("line events"));
                    }
                    None => {
                        debug!("line event stream closed");
                        self.line_events_open = false;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await?,
                    None => return Err(BridgeError::ChannelClosed("command")),
                },
            }
        }
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeLine, LineLog, SpyGateway};
    use gpiobridge_domain::line::LineId;
    use gpiobridge_domain::port::{Port, PortSpec};

    const LIGHTS: LineId = LineId::new(18);
    const BUTTON: LineId = LineId::new(12);

    struct Harness {
        dispatcher: Dispatcher<SpyGateway, FakeLine>,
        gateway: SpyGateway,
        log: LineLog,
        debounced_tx: mpsc::UnboundedSender<Debounced>,
        commands_tx: mpsc::UnboundedSender<Command>,
    }

    fn harness(specs: &[&str]) -> Harness {
        let system = SystemConfig::default();
        let log = LineLog::default();
        let mut registry = Registry::new();
        for spec in specs {
            let spec: PortSpec = spec.parse().unwrap();
            registry
                .register(
                    Port::new(&spec, PortState::Off),
                    FakeLine::new(spec.line, log.clone()),
                )
                .unwrap();
        }
        let gateway = SpyGateway::new(system.clone());
        let (debounced_tx, debounced_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Harness {
            dispatcher: Dispatcher::new(
                system,
                registry,
                gateway.clone(),
                debounced_rx,
                commands_rx,
            ),
            gateway,
            log,
            debounced_tx,
            commands_tx,
        }
    }

    fn set(line: LineId, payload: &str) -> Command {
        Command::new(format!("homeassistant/switch/raspi-gpio/{line}/set"), payload)
    }

    #[tokio::test]
    async fn should_drive_output_and_publish_on_command() {
        let mut h = harness(&["18:o:lights"]);
        h.dispatcher.handle_command(set(LIGHTS, "ON")).await.unwrap();

        assert_eq!(h.log.driven(), vec![(LIGHTS, PortState::On)]);
        assert_eq!(
            h.dispatcher.registry().lookup(LIGHTS).unwrap().state,
            PortState::On
        );
        assert_eq!(
            h.gateway.states(),
            vec![("homeassistant/switch/raspi-gpio/18/state".to_string(), "ON")]
        );
    }

    #[tokio::test]
    async fn should_drive_output_low_on_off_command() {
        let mut h = harness(&["18:o:lights"]);
        h.dispatcher.handle_command(set(LIGHTS, "ON")).await.unwrap();
        h.dispatcher.handle_command(set(LIGHTS, "OFF")).await.unwrap();

        assert_eq!(
            h.log.driven(),
            vec![(LIGHTS, PortState::On), (LIGHTS, PortState::Off)]
        );
        assert_eq!(h.gateway.states().last().unwrap().1, "OFF");
    }

    #[tokio::test]
    async fn should_publish_state_on_debounced_event() {
        let mut h = harness(&["12:i:button"]);
        h.dispatcher
            .handle_debounced(Debounced {
                line: BUTTON,
                state: PortState::On,
            })
            .await
            .unwrap();

        assert_eq!(
            h.gateway.states(),
            vec![(
                "homeassistant/binary_sensor/raspi-gpio/12/state".to_string(),
                "ON"
            )]
        );
        assert!(h.log.driven().is_empty());
    }

    #[tokio::test]
    async fn should_fail_on_debounced_event_for_unknown_line() {
        let mut h = harness(&["12:i:button"]);
        let result = h
            .dispatcher
            .handle_debounced(Debounced {
                line: LineId::new(99),
                state: PortState::On,
            })
            .await;
        assert!(matches!(result, Err(BridgeError::Invariant(_))));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn should_reject_command_addressed_to_input() {
        let mut h = harness(&["12:i:button"]);
        let result = h.dispatcher.handle_command(set(BUTTON, "ON")).await;
        assert!(matches!(
            result,
            Err(BridgeError::Protocol(ProtocolError::NotAnOutput(_)))
        ));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn should_reject_command_for_unknown_line() {
        let mut h = harness(&["18:o:lights"]);
        let result = h.dispatcher.handle_command(set(LineId::new(5), "ON")).await;
        assert!(matches!(
            result,
            Err(BridgeError::Protocol(ProtocolError::UnknownLine(_)))
        ));
    }

    #[tokio::test]
    async fn should_reject_unknown_payload_without_driving() {
        let mut h = harness(&["18:o:lights"]);
        let result = h.dispatcher.handle_command(set(LIGHTS, "TOGGLE")).await;
        assert!(matches!(
            result,
            Err(BridgeError::Protocol(ProtocolError::UnknownPayload(_)))
        ));
        assert!(h.log.driven().is_empty());
        assert_eq!(
            h.dispatcher.registry().lookup(LIGHTS).unwrap().state,
            PortState::Off
        );
    }

    #[tokio::test]
    async fn should_reject_malformed_topic() {
        let mut h = harness(&["18:o:lights"]);
        let result = h
            .dispatcher
            .handle_command(Command::new("homeassistant/switch/raspi-gpio/18", "ON"))
            .await;
        assert!(matches!(
            result,
            Err(BridgeError::Protocol(ProtocolError::MalformedTopic(_)))
        ));
    }

    #[tokio::test]
    async fn should_ignore_violations_under_ignore_policy() {
        let mut h = harness(&["18:o:lights", "12:i:button"]);
        let mut dispatcher = h.dispatcher.with_policy(ProtocolPolicy::Ignore);
        dispatcher.handle_command(set(LIGHTS, "BLINK")).await.unwrap();
        dispatcher.handle_command(set(BUTTON, "ON")).await.unwrap();
        dispatcher.handle_command(set(LIGHTS, "ON")).await.unwrap();
        h.dispatcher = dispatcher;

        assert_eq!(h.log.driven(), vec![(LIGHTS, PortState::On)]);
        assert_eq!(h.gateway.states().len(), 1);
    }

    #[tokio::test]
    async fn should_keep_last_processed_value_for_same_line() {
        let mut h = harness(&["18:o:lights"]);
        h.dispatcher.handle_command(set(LIGHTS, "ON")).await.unwrap();
        h.dispatcher
            .handle_debounced(Debounced {
                line: LIGHTS,
                state: PortState::Off,
            })
            .await
            .unwrap();
        assert_eq!(
            h.dispatcher.registry().lookup(LIGHTS).unwrap().state,
            PortState::Off
        );

        h.dispatcher.handle_command(set(LIGHTS, "ON")).await.unwrap();
        assert_eq!(
            h.dispatcher.registry().lookup(LIGHTS).unwrap().state,
            PortState::On
        );
        let payloads: Vec<_> = h.gateway.states().into_iter().map(|(_, p)| p).collect();
        assert_eq!(payloads, vec!["ON", "OFF", "ON"]);
    }

    #[tokio::test]
    async fn should_retract_and_release_each_port_once_on_shutdown() {
        let h = harness(&["18:o:lights", "12:i:button", "4:i:door"]);
        let report = h.dispatcher.shutdown().await.unwrap();

        assert_eq!(
            report,
            ShutdownReport {
                retracted: 3,
                released: 3
            }
        );
        let mut retracted: Vec<_> = h
            .gateway
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Unadvertise(line) => Some(line.get()),
                _ => None,
            })
            .collect();
        retracted.sort_unstable();
        assert_eq!(retracted, vec![4, 12, 18]);
        let mut released: Vec<_> = h.log.released().iter().map(|l| l.get()).collect();
        released.sort_unstable();
        assert_eq!(released, vec![4, 12, 18]);
    }

    #[tokio::test]
    async fn should_process_queued_events_then_shut_down() {
        let h = harness(&["18:o:lights", "12:i:button"]);
        h.commands_tx.send(set(LIGHTS, "ON")).unwrap();
        h.debounced_tx
            .send(Debounced {
                line: BUTTON,
                state: PortState::On,
            })
            .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let gateway = h.gateway.clone();
        let task = tokio::spawn(h.dispatcher.run(async {
            let _ = stop_rx.await;
        }));

        while gateway.states().len() < 2 {
            tokio::task::yield_now().await;
        }
        stop_tx.send(()).unwrap();
        let report = task.await.unwrap().unwrap();

        assert_eq!(report.released, 2);
        assert_eq!(h.log.released().len(), 2);
        assert_eq!(h.log.driven(), vec![(LIGHTS, PortState::On)]);
    }

    #[tokio::test]
    async fn should_stop_on_fatal_command_in_run_loop() {
        let h = harness(&["12:i:button"]);
        h.commands_tx.send(set(BUTTON, "ON")).unwrap();
        let result = h.dispatcher.run(std::future::pending()).await;
        assert!(matches!(
            result,
            Err(BridgeError::Protocol(ProtocolError::NotAnOutput(_)))
        ));
        assert!(h.log.released().is_empty());
    }

    #[tokio::test]
    async fn should_fail_when_command_stream_closes() {
        let h = harness(&["18:o:lights"]);
        drop(h.commands_tx);
        let result = h.dispatcher.run(std::future::pending()).await;
        assert!(matches!(result, Err(BridgeError::ChannelClosed("command"))));
    }

    #[tokio::test]
    async fn should_fail_when_line_events_close_with_inputs_registered() {
        let h = harness(&["18:o:lights", "12:i:button"]);
        drop(h.debounced_tx);
        let result = h.dispatcher.run(std::future::pending()).await;
        assert!(matches!(
            result,
            Err(BridgeError::ChannelClosed("line events"))
        ));
    }

    #[tokio::test]
    async fn should_end_with_last_published_state_when_sources_interleave() {
        let h = harness(&["18:o:lights"]);
        h.commands_tx.send(set(LIGHTS, "ON")).unwrap();
        h.debounced_tx
            .send(Debounced {
                line: LIGHTS,
                state: PortState::Off,
            })
            .unwrap();
        h.commands_tx.send(set(LIGHTS, "OFF")).unwrap();
        h.debounced_tx
            .send(Debounced {
                line: LIGHTS,
                state: PortState::On,
            })
            .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let gateway = h.gateway.clone();
        let task = tokio::spawn(h.dispatcher.run(async {
            let _ = stop_rx.await;
        }));
        while gateway.states().len() < 4 {
            tokio::task::yield_now().await;
        }
        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        let last = gateway.states().last().unwrap().1;
        assert_eq!(gateway.retired(), vec![(LIGHTS, PortState::decode(last).unwrap())]);
    }

    #[tokio::test]
    async fn should_keep_running_after_line_events_close() {
        let h = harness(&["18:o:lights"]);
        drop(h.debounced_tx);
        h.commands_tx.send(set(LIGHTS, "ON")).unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let gateway = h.gateway.clone();
        let task = tokio::spawn(h.dispatcher.run(async {
            let _ = stop_rx.await;
        }));
        while gateway.states().is_empty() {
            tokio::task::yield_now().await;
        }
        stop_tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
