//! Broker seams.
//!
//! `ConsumerLoop` talks to the broker only through these two traits, so the
//! loop can be driven by scripted sessions in tests.

use crate::error::WorkerError;
use async_trait::async_trait;

/// A message received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub data: Vec<u8>,
    /// Set by the broker when the message was delivered before without an ack
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(delivery_tag: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            data: data.into(),
            redelivered: false,
        }
    }
}

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    type Session: BrokerSession;

    /// Open a connection and a channel on it.
    async fn connect(&self) -> Result<Self::Session, WorkerError>;
}

/// One connection plus its channel and consumer.
#[async_trait]
pub trait BrokerSession: Send {
    /// Declare `queue` durable, apply the prefetch bound and start a
    /// manual-ack consumer on it.
    async fn declare(&mut self, queue: &str, prefetch_count: u16) -> Result<(), WorkerError>;

    /// Wait for the next delivery.
    ///
    /// Returns `WorkerError::ConsumerClosed` when the consumer stream ends.
    async fn next_delivery(&mut self) -> Result<Delivery, WorkerError>;

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), WorkerError>;

    /// Close channel and connection. Errors are for logging only.
    async fn close(&mut self) -> Result<(), WorkerError>;
}
