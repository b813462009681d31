//! Scripted in-memory broker.

use amqp_worker::{BrokerConnector, BrokerSession, Delivery, WorkerError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Something the consumer did against the scripted broker, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    ConnectRefused { attempt: u32 },
    Connected { session: usize },
    Declared { session: usize, queue: String, prefetch_count: u16 },
    Delivered { session: usize, delivery_tag: u64 },
    Acked { session: usize, delivery_tag: u64 },
    Closed { session: usize },
}

/// Behavior of one session handed out by the broker.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    declare_error: Option<String>,
    deliveries: VecDeque<Vec<u8>>,
    fail_ack_for: Option<u64>,
    close_after_deliveries: bool,
}

impl SessionScript {
    /// Session that declares fine and then waits forever for messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message body. Delivery tags start at 1 per session.
    pub fn deliver(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.deliveries.push_back(body.into());
        self
    }

    pub fn fail_declare(mut self, message: impl Into<String>) -> Self {
        self.declare_error = Some(message.into());
        self
    }

    /// Make the ack for `delivery_tag` fail as a lost channel would.
    pub fn fail_ack(mut self, delivery_tag: u64) -> Self {
        self.fail_ack_for = Some(delivery_tag);
        self
    }

    /// End the consumer stream once the queued deliveries are consumed.
    pub fn then_close(mut self) -> Self {
        self.close_after_deliveries = true;
        self
    }
}

enum ConnectStep {
    Refuse(String),
    RejectConfig(String),
    Open(SessionScript),
}

#[derive(Default)]
struct State {
    steps: VecDeque<ConnectStep>,
    events: Vec<BrokerEvent>,
    connect_attempts: u32,
    sessions_opened: usize,
    open_sessions: usize,
    max_open_sessions: usize,
}

/// In-memory broker driven by a script of connect outcomes.
///
/// Once the script runs out, further connects are refused.
#[derive(Clone, Default)]
pub struct ScriptedBroker {
    state: Arc<Mutex<State>>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next connect attempt fails with a connection error.
    pub fn refuse(self, message: impl Into<String>) -> Self {
        self.lock().steps.push_back(ConnectStep::Refuse(message.into()));
        self
    }

    /// Next connect attempt fails with a configuration error, as lapin reports
    /// an unusable URI.
    pub fn reject_config(self, message: impl Into<String>) -> Self {
        self.lock()
            .steps
            .push_back(ConnectStep::RejectConfig(message.into()));
        self
    }

    /// Next connect attempt fails `times` times in a row.
    pub fn refuse_times(self, times: usize, message: &str) -> Self {
        (0..times).fold(self, |broker, _| broker.refuse(message))
    }

    /// Next connect attempt opens a session following `script`.
    pub fn session(self, script: SessionScript) -> Self {
        self.lock().steps.push_back(ConnectStep::Open(script));
        self
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.lock().events.clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Delivery tags acknowledged so far, as `(session, tag)`.
    pub fn acked(&self) -> Vec<(usize, u64)> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                BrokerEvent::Acked {
                    session,
                    delivery_tag,
                } => Some((*session, *delivery_tag)),
                _ => None,
            })
            .collect()
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Highest number of sessions that were open at the same time.
    pub fn max_open_sessions(&self) -> usize {
        self.lock().max_open_sessions
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BrokerConnector for ScriptedBroker {
    type Session = ScriptedSession;

    async fn connect(&self) -> Result<ScriptedSession, WorkerError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        let attempt = state.connect_attempts;

        match state.steps.pop_front() {
            Some(ConnectStep::Open(script)) => {
                state.sessions_opened += 1;
                state.open_sessions += 1;
                state.max_open_sessions = state.max_open_sessions.max(state.open_sessions);
                let id = state.sessions_opened;
                state.events.push(BrokerEvent::Connected { session: id });

                Ok(ScriptedSession {
                    id,
                    script,
                    next_tag: 0,
                    closed: false,
                    broker: self.clone(),
                })
            }
            Some(ConnectStep::Refuse(message)) => {
                state.events.push(BrokerEvent::ConnectRefused { attempt });
                Err(WorkerError::Connection(message))
            }
            Some(ConnectStep::RejectConfig(message)) => {
                state.events.push(BrokerEvent::ConnectRefused { attempt });
                Err(WorkerError::Config(message))
            }
            None => {
                state.events.push(BrokerEvent::ConnectRefused { attempt });
                Err(WorkerError::Connection("connection refused".to_string()))
            }
        }
    }
}

/// Session handed out by `ScriptedBroker`.
pub struct ScriptedSession {
    id: usize,
    script: SessionScript,
    next_tag: u64,
    closed: bool,
    broker: ScriptedBroker,
}

impl ScriptedSession {
    fn record(&self, event: BrokerEvent) {
        self.broker.lock().events.push(event);
    }
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn declare(&mut self, queue: &str, prefetch_count: u16) -> Result<(), WorkerError> {
        if let Some(message) = self.script.declare_error.clone() {
            return Err(WorkerError::Channel(message));
        }
        self.record(BrokerEvent::Declared {
            session: self.id,
            queue: queue.to_string(),
            prefetch_count,
        });
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Delivery, WorkerError> {
        match self.script.deliveries.pop_front() {
            Some(body) => {
                self.next_tag += 1;
                self.record(BrokerEvent::Delivered {
                    session: self.id,
                    delivery_tag: self.next_tag,
                });
                Ok(Delivery::new(self.next_tag, body))
            }
            None if self.script.close_after_deliveries => Err(WorkerError::ConsumerClosed),
            None => std::future::pending().await,
        }
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), WorkerError> {
        if self.script.fail_ack_for == Some(delivery_tag) {
            return Err(WorkerError::Ack {
                delivery_tag,
                message: "channel closed".to_string(),
            });
        }
        self.record(BrokerEvent::Acked {
            session: self.id,
            delivery_tag,
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WorkerError> {
        if !self.closed {
            self.closed = true;
            let mut state = self.broker.lock();
            state.open_sessions -= 1;
            state.events.push(BrokerEvent::Closed { session: self.id });
        }
        Ok(())
    }
}
