//! Broker event loop: drives the connection and turns messages received on
//! command topics into [`Command`]s.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gpiobridge_domain::event::Command;

use crate::gateway::Subscriptions;

/// Owns the rumqttc [`EventLoop`]. Must be polled (see [`MqttEventLoop::run`])
/// for any gateway request to reach the broker.
pub struct MqttEventLoop {
    event_loop: EventLoop,
    client: AsyncClient,
    qos: QoS,
    subscriptions: Subscriptions,
    commands: mpsc::UnboundedSender<Command>,
    reconnect_delay: Duration,
}

impl MqttEventLoop {
    pub(crate) fn new(
        event_loop: EventLoop,
        client: AsyncClient,
        qos: QoS,
        subscriptions: Subscriptions,
        commands: mpsc::UnboundedSender<Command>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            event_loop,
            client,
            qos,
            subscriptions,
            commands,
            reconnect_delay,
        }
    }

    /// Poll the connection until a disconnect request has been sent or the
    /// command receiver is dropped.
    ///
    /// Connection errors are logged and retried after the reconnect delay;
    /// rumqttc reconnects on the next poll.
    pub async fn run(mut self) {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(session_present = ack.session_present, "connected to broker");
                    if !ack.session_present {
                        self.resubscribe();
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let command = command_from_publish(&publish);
                    debug!(topic = %command.topic, "command message received");
                    if self.commands.send(command).is_err() {
                        debug!("command receiver dropped, stopping broker event loop");
                        return;
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("disconnected from broker");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "broker connection error");
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// Replay every known command subscription.
    ///
    /// Uses `try_subscribe` because awaiting the request queue from inside the
    /// loop that drains it could stall.
    fn resubscribe(&self) {
        for topic in self.subscriptions.snapshot() {
            debug!(topic = %topic, "resubscribing");
            if let Err(err) = self.client.try_subscribe(topic.clone(), self.qos) {
                warn!(topic = %topic, error = %err, "unable to resubscribe");
            }
        }
    }
}

pub(crate) fn command_from_publish(publish: &Publish) -> Command {
    Command::new(
        String::from_utf8_lossy(publish.topic.as_ref()).into_owned(),
        String::from_utf8_lossy(&publish.payload).into_owned(),
    )
}
