//! [`BrokerGateway`] implementation on top of a rumqttc [`AsyncClient`].

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use rumqttc::{AsyncClient, QoS};
use tracing::debug;

use gpiobridge_app::ports::BrokerGateway;
use gpiobridge_domain::discovery::DiscoveryPayload;
use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::port::Port;
use gpiobridge_domain::system::{Qos, SystemConfig};

use crate::error::MqttError;

#[must_use]
pub fn map_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// One message to hand to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Retained discovery document for `port`.
pub(crate) fn advertisement(system: &SystemConfig, port: &Port) -> Result<Outbound, MqttError> {
    let payload = DiscoveryPayload::for_port(system, port)
        .to_json()
        .map_err(MqttError::Encode)?;
    Ok(Outbound {
        topic: system.config_topic(port),
        payload: payload.into_bytes(),
        retain: true,
    })
}

/// Empty retained message clearing the discovery document.
pub(crate) fn retraction(system: &SystemConfig, port: &Port) -> Outbound {
    Outbound {
        topic: system.config_topic(port),
        payload: Vec::new(),
        retain: true,
    }
}

pub(crate) fn state_update(system: &SystemConfig, port: &Port) -> Outbound {
    Outbound {
        topic: system.state_topic(port),
        payload: port.state.encode().as_bytes().to_vec(),
        retain: false,
    }
}

/// Command topics subscribed so far, replayed after every reconnection.
#[derive(Debug, Clone, Default)]
pub(crate) struct Subscriptions(Arc<Mutex<BTreeSet<String>>>);

impl Subscriptions {
    pub fn insert(&self, topic: String) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Publish side of the broker connection.
#[derive(Clone)]
pub struct MqttGateway {
    client: AsyncClient,
    system: SystemConfig,
    subscriptions: Subscriptions,
}

impl MqttGateway {
    pub(crate) fn new(client: AsyncClient, system: SystemConfig, subscriptions: Subscriptions) -> Self {
        Self {
            client,
            system,
            subscriptions,
        }
    }

    /// Ask the event loop to disconnect once every queued request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Gateway`] if the event loop is already gone.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        self.client.disconnect().await.map_err(MqttError::from)?;
        Ok(())
    }

    async fn send(client: AsyncClient, qos: QoS, message: Outbound) -> Result<(), BridgeError> {
        debug!(topic = %message.topic, retain = message.retain, "publishing");
        client
            .publish(message.topic, qos, message.retain, message.payload)
            .await
            .map_err(MqttError::from)?;
        Ok(())
    }
}

impl BrokerGateway for MqttGateway {
    fn advertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let client = self.client.clone();
        let qos = map_qos(self.system.qos);
        let message = advertisement(&self.system, port);
        let command_topic = port.is_output().then(|| self.system.command_topic(port));
        let subscriptions = self.subscriptions.clone();
        async move {
            if let Some(topic) = command_topic {
                debug!(topic = %topic, "subscribing to command topic");
                subscriptions.insert(topic.clone());
                client.subscribe(topic, qos).await.map_err(MqttError::from)?;
            }
            Self::send(client, qos, message?).await
        }
    }

    fn unadvertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        Self::send(
            self.client.clone(),
            map_qos(self.system.qos),
            retraction(&self.system, port),
        )
    }

    fn publish_state(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        Self::send(
            self.client.clone(),
            map_qos(self.system.qos),
            state_update(&self.system, port),
        )
    }
}
