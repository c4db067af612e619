//! In-memory fakes shared by the unit tests of this crate.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use gpiobridge_domain::discovery::DiscoveryPayload;
use gpiobridge_domain::error::BridgeError;
use gpiobridge_domain::event::RawTransition;
use gpiobridge_domain::line::LineId;
use gpiobridge_domain::port::{Port, PortSpec, PortState};
use gpiobridge_domain::system::SystemConfig;

use crate::ports::{BrokerGateway, LineDriver, LineHandle};

// ── Line handles ───────────────────────────────────────────────

/// Shared record of everything done to fake lines.
#[derive(Clone, Default)]
pub struct LineLog {
    driven: Arc<Mutex<Vec<(LineId, PortState)>>>,
    released: Arc<Mutex<Vec<LineId>>>,
}

impl LineLog {
    pub fn driven(&self) -> Vec<(LineId, PortState)> {
        self.driven.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<LineId> {
        self.released.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct FakeIoError;

impl std::fmt::Display for FakeIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("fake io error")
    }
}

impl std::error::Error for FakeIoError {}

pub struct FakeLine {
    line: LineId,
    level: PortState,
    fail: bool,
    unreadable: bool,
    log: LineLog,
}

impl FakeLine {
    pub fn new(line: LineId, log: LineLog) -> Self {
        Self {
            line,
            level: PortState::Off,
            fail: false,
            unreadable: false,
            log,
        }
    }

    pub fn failing(line: LineId, log: LineLog) -> Self {
        Self {
            fail: true,
            ..Self::new(line, log)
        }
    }

    pub fn line(&self) -> LineId {
        self.line
    }
}

impl LineHandle for FakeLine {
    fn read(&self) -> Result<PortState, BridgeError> {
        if self.unreadable {
            return Err(BridgeError::Hardware(Box::new(FakeIoError)));
        }
        Ok(self.level)
    }

    fn drive(&mut self, state: PortState) -> Result<(), BridgeError> {
        if self.fail {
            return Err(BridgeError::Hardware(Box::new(FakeIoError)));
        }
        self.level = state;
        self.log.driven.lock().unwrap().push((self.line, state));
        Ok(())
    }

    fn release(self) -> Result<(), BridgeError> {
        self.log.released.lock().unwrap().push(self.line);
        Ok(())
    }
}

/// Driver handing out [`FakeLine`]s and keeping the transition senders so
/// tests can play the part of the line watchers.
#[derive(Default)]
pub struct FakeDriver {
    pub log: LineLog,
    pub initial: Vec<(LineId, PortState)>,
    pub watchers: Vec<(LineId, mpsc::UnboundedSender<RawTransition>)>,
    pub unavailable: Vec<LineId>,
    pub unreadable: Vec<LineId>,
}

impl FakeDriver {
    pub fn watcher(&self, line: LineId) -> mpsc::UnboundedSender<RawTransition> {
        self.watchers
            .iter()
            .find(|(l, _)| *l == line)
            .map(|(_, tx)| tx.clone())
            .unwrap()
    }

    fn claim(&self, spec: &PortSpec) -> Result<FakeLine, BridgeError> {
        if self.unavailable.contains(&spec.line) {
            return Err(BridgeError::Hardware(Box::new(FakeIoError)));
        }
        let mut line = FakeLine::new(spec.line, self.log.clone());
        line.unreadable = self.unreadable.contains(&spec.line);
        if let Some((_, level)) = self.initial.iter().find(|(l, _)| *l == spec.line) {
            line.level = *level;
        }
        Ok(line)
    }
}

impl LineDriver for FakeDriver {
    type Handle = FakeLine;

    fn claim_input(
        &mut self,
        spec: &PortSpec,
        transitions: mpsc::UnboundedSender<RawTransition>,
    ) -> Result<FakeLine, BridgeError> {
        let line = self.claim(spec)?;
        self.watchers.push((spec.line, transitions));
        Ok(line)
    }

    fn claim_output(&mut self, spec: &PortSpec) -> Result<FakeLine, BridgeError> {
        self.claim(spec)
    }
}

// ── Gateway ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Advertise { line: LineId, payload: String },
    Unadvertise(LineId),
    State { topic: String, payload: &'static str },
}

/// Gateway recording every call in order.
#[derive(Clone)]
pub struct SpyGateway {
    system: SystemConfig,
    calls: Arc<Mutex<Vec<Call>>>,
    retired: Arc<Mutex<Vec<(LineId, PortState)>>>,
}

impl SpyGateway {
    pub fn new(system: SystemConfig) -> Self {
        Self {
            system,
            calls: Arc::new(Mutex::new(Vec::new())),
            retired: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// State each port held when it was retracted.
    pub fn retired(&self) -> Vec<(LineId, PortState)> {
        self.retired.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<(String, &'static str)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::State { topic, payload } => Some((topic, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl BrokerGateway for SpyGateway {
    fn advertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let payload = DiscoveryPayload::for_port(&self.system, port)
            .to_json()
            .unwrap();
        self.calls.lock().unwrap().push(Call::Advertise {
            line: port.line,
            payload,
        });
        async { Ok(()) }
    }

    fn unadvertise(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.calls.lock().unwrap().push(Call::Unadvertise(port.line));
        self.retired.lock().unwrap().push((port.line, port.state));
        async { Ok(()) }
    }

    fn publish_state(&self, port: &Port) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.calls.lock().unwrap().push(Call::State {
            topic: self.system.state_topic(port),
            payload: port.state.encode(),
        });
        async { Ok(()) }
    }
}
