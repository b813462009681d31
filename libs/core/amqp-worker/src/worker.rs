//! Message handler trait and the `ConsumerLoop` state machine.
//!
//! ```text
//! Disconnected ──> Connecting ──> Declaring ──> Consuming
//!      ^               │  bounded backoff │          │
//!      └───────────────┴──────────────────┴──────────┘  connection lost
//!
//!   any state ──> ShuttingDown   (shutdown requested)
//! ```
//!
//! Every received delivery is acknowledged after its handler returns,
//! whatever the disposition. Only a broker-level failure skips the ack, and
//! the broker then redelivers the message to the next session.

use crate::broker::{BrokerConnector, BrokerSession, Delivery};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::metrics::QueueMetrics;
use crate::retry::{RetryError, retry_with_backoff, shutdown_requested, wait_for_shutdown};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Outcome of handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The message was fully processed
    Completed,
    /// The payload or its template data is unusable
    Rejected { reason: String },
    /// Processing was attempted and did not succeed
    Failed { reason: String },
}

impl Disposition {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Disposition::Rejected {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Disposition::Failed {
            reason: reason.into(),
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Completed => "completed",
            Disposition::Rejected { .. } => "rejected",
            Disposition::Failed { .. } => "failed",
        }
    }
}

/// Handles the raw body of one delivery.
///
/// Implementations report every outcome as a `Disposition`; the loop never
/// sees per-message errors.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Disposition;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Observable lifecycle state of a `ConsumerLoop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Declaring,
    Consuming,
    ShuttingDown,
}

/// Snapshot of the loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub acknowledged: u64,
    pub completed: u64,
    pub rejected: u64,
    pub failed: u64,
    /// Connection cycles started, including the first one
    pub connection_cycles: u64,
}

#[derive(Default)]
struct StatsCounters {
    received: AtomicU64,
    acknowledged: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    connection_cycles: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::SeqCst),
            acknowledged: self.acknowledged.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            connection_cycles: self.connection_cycles.load(Ordering::SeqCst),
        }
    }
}

/// Single-session queue consumer.
///
/// Owns the broker session exclusively and handles one delivery at a time,
/// in receipt order. Scale out by running more processes on the same queue.
pub struct ConsumerLoop<C, H>
where
    C: BrokerConnector,
    H: MessageHandler,
{
    connector: C,
    handler: Arc<H>,
    config: WorkerConfig,
    state: watch::Sender<ConsumerState>,
    stats: StatsCounters,
    metrics: QueueMetrics,
}

impl<C, H> ConsumerLoop<C, H>
where
    C: BrokerConnector,
    H: MessageHandler + 'static,
{
    pub fn new(connector: C, handler: H, config: WorkerConfig) -> Self {
        Self::with_arc_handler(connector, Arc::new(handler), config)
    }

    pub fn with_arc_handler(connector: C, handler: Arc<H>, config: WorkerConfig) -> Self {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        let metrics = QueueMetrics::new(&config.service_name, config.queue_name.clone());

        Self {
            connector,
            handler,
            config,
            state,
            stats: StatsCounters::default(),
            metrics,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.snapshot()
    }

    /// Run until shutdown is requested.
    ///
    /// Shutdown is a `true` on the watch channel or the sender being dropped.
    /// It interrupts waiting for a message and any backoff pause; a message
    /// already being handled is finished and acknowledged first.
    ///
    /// Broker failures never end the loop, configuration errors included:
    /// each exhausted cycle is followed by the fixed pause and a new cycle.
    /// Bad settings are caught when the configuration is loaded.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!(
            queue = %self.config.queue_name,
            prefetch_count = self.config.prefetch_count,
            consumer_tag = %self.config.consumer_tag,
            handler = self.handler.name(),
            "Starting consumer loop"
        );

        let result = loop {
            if shutdown_requested(&shutdown) {
                break Ok(());
            }

            let cycle = self.stats.connection_cycles.fetch_add(1, Ordering::SeqCst) + 1;
            if cycle > 1 {
                self.metrics.reconnect();
            }

            let mut session = match self.establish(&mut shutdown).await {
                Ok(session) => session,
                Err(RetryError::Cancelled) => break Ok(()),
                Err(RetryError::Exhausted {
                    attempts,
                    last_error,
                }) => {
                    self.set_state(ConsumerState::Disconnected);
                    error!(
                        attempts,
                        error = %last_error,
                        recoverable = last_error.is_connection_error(),
                        retry_in_secs = self.config.retry_interval.as_secs(),
                        "Connection attempts exhausted, retrying after fixed interval"
                    );
                    if !self.pause(&mut shutdown).await {
                        break Ok(());
                    }
                    continue;
                }
            };

            self.set_state(ConsumerState::Consuming);
            info!(queue = %self.config.queue_name, cycle, "Waiting for messages");

            match self.consume(&mut session, &mut shutdown).await {
                Ok(()) => {
                    self.set_state(ConsumerState::ShuttingDown);
                    close_session(&mut session).await;
                    break Ok(());
                }
                Err(e) => {
                    close_session(&mut session).await;
                    self.set_state(ConsumerState::Disconnected);
                    warn!(
                        error = %e,
                        retry_in_secs = self.config.retry_interval.as_secs(),
                        "Lost broker connection, reconnecting"
                    );
                    if !self.pause(&mut shutdown).await {
                        break Ok(());
                    }
                }
            }
        };

        self.set_state(ConsumerState::ShuttingDown);
        let stats = self.stats();
        info!(
            received = stats.received,
            acknowledged = stats.acknowledged,
            completed = stats.completed,
            rejected = stats.rejected,
            failed = stats.failed,
            "Consumer loop stopped"
        );
        result
    }

    /// Connect and declare under the bounded backoff.
    ///
    /// A session that fails to declare is closed before the next attempt, so
    /// no two connections from the same cycle are ever open together.
    async fn establish(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<C::Session, RetryError<WorkerError>> {
        let connector = &self.connector;
        let state = &self.state;
        let queue = self.config.queue_name.as_str();
        let prefetch_count = self.config.prefetch_count;

        retry_with_backoff(&self.config.backoff, shutdown, move || async move {
            state.send_replace(ConsumerState::Connecting);
            let mut session = connector.connect().await?;

            state.send_replace(ConsumerState::Declaring);
            if let Err(e) = session.declare(queue, prefetch_count).await {
                close_session(&mut session).await;
                return Err(e);
            }

            info!(queue, prefetch_count, "Connected to broker");
            Ok(session)
        })
        .await
    }

    /// Receive, handle and acknowledge until shutdown or a broker error.
    ///
    /// `Ok` means shutdown was requested.
    async fn consume(
        &self,
        session: &mut C::Session,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WorkerError> {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return Ok(()),
                delivery = session.next_delivery() => delivery?,
            };

            self.stats.received.fetch_add(1, Ordering::SeqCst);
            self.metrics.message_received();

            let delivery_tag = delivery.delivery_tag;
            let disposition = self.dispatch(delivery).await;
            self.record(delivery_tag, &disposition);

            session.ack(delivery_tag).await?;
            self.stats.acknowledged.fetch_add(1, Ordering::SeqCst);
            self.metrics.message_acknowledged();
        }
    }

    /// Run the handler in its own task so a panic stays with one message.
    async fn dispatch(&self, delivery: Delivery) -> Disposition {
        debug!(
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            bytes = delivery.data.len(),
            "Received message"
        );

        let handler = Arc::clone(&self.handler);
        let task = tokio::spawn(async move { handler.handle(&delivery.data).await });

        match task.await {
            Ok(disposition) => disposition,
            Err(join_error) if join_error.is_panic() => {
                error!(handler = self.handler.name(), "Message handler panicked");
                Disposition::failed("message handler panicked")
            }
            Err(join_error) => Disposition::failed(format!("message handler aborted: {}", join_error)),
        }
    }

    fn record(&self, delivery_tag: u64, disposition: &Disposition) {
        self.metrics.disposition(disposition.label());

        match disposition {
            Disposition::Completed => {
                self.stats.completed.fetch_add(1, Ordering::SeqCst);
                debug!(delivery_tag, "Message completed");
            }
            Disposition::Rejected { reason } => {
                self.stats.rejected.fetch_add(1, Ordering::SeqCst);
                warn!(delivery_tag, reason = %reason, "Discarding message");
            }
            Disposition::Failed { reason } => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!(delivery_tag, reason = %reason, "Message failed, acknowledging without retry");
            }
        }
    }

    /// Fixed pause between cycles. Returns `false` when shutdown cut it short.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => false,
            _ = tokio::time::sleep(self.config.retry_interval) => true,
        }
    }

    fn set_state(&self, state: ConsumerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Consumer state changed");
        }
    }
}

async fn close_session<S: BrokerSession>(session: &mut S) {
    if let Err(e) = session.close().await {
        debug!(error = %e, "Error while closing broker session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Refusing;

    struct NeverUsed;

    #[async_trait]
    impl BrokerSession for NeverUsed {
        async fn declare(&mut self, _: &str, _: u16) -> Result<(), WorkerError> {
            Ok(())
        }

        async fn next_delivery(&mut self) -> Result<Delivery, WorkerError> {
            Err(WorkerError::ConsumerClosed)
        }

        async fn ack(&mut self, _: u64) -> Result<(), WorkerError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), WorkerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl BrokerConnector for Refusing {
        type Session = NeverUsed;

        async fn connect(&self) -> Result<NeverUsed, WorkerError> {
            Err(WorkerError::Config("invalid broker URL".into()))
        }
    }

    struct Noop;

    #[async_trait]
    impl MessageHandler for Noop {
        async fn handle(&self, _payload: &[u8]) -> Disposition {
            Disposition::Completed
        }

        fn name(&self) -> &'static str {
            "noop"
        }
    }

    #[test]
    fn test_disposition_labels() {
        assert_eq!(Disposition::Completed.label(), "completed");
        assert_eq!(Disposition::rejected("bad json").label(), "rejected");
        assert_eq!(Disposition::failed("smtp down").label(), "failed");
        assert_eq!(
            Disposition::rejected("x"),
            Disposition::Rejected {
                reason: "x".to_string()
            }
        );
    }

    #[test]
    fn test_new_loop_starts_disconnected() {
        let worker = ConsumerLoop::new(Refusing, Noop, WorkerConfig::new("tasks"));
        assert_eq!(worker.state(), ConsumerState::Disconnected);
        assert_eq!(worker.stats(), ConsumerStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_errors_keep_the_loop_retrying() {
        let worker = Arc::new(ConsumerLoop::new(Refusing, Noop, WorkerConfig::new("tasks")));
        let (tx, rx) = watch::channel(false);

        let runner = Arc::clone(&worker);
        let handle = tokio::spawn(async move { runner.run(rx).await });

        // 1+2+4+8 backoff and a 15s pause per cycle; the third pause runs 75..90
        tokio::time::sleep(Duration::from_secs(80)).await;
        assert!(!handle.is_finished());
        assert_eq!(worker.stats().connection_cycles, 3);
        assert_eq!(worker.state(), ConsumerState::Disconnected);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(worker.state(), ConsumerState::ShuttingDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start_returns_immediately() {
        let worker = ConsumerLoop::new(Refusing, Noop, WorkerConfig::new("tasks"));
        let (tx, rx) = watch::channel(true);

        tokio::time::timeout(Duration::from_secs(1), worker.run(rx))
            .await
            .expect("loop should stop at once")
            .unwrap();
        assert_eq!(worker.stats().connection_cycles, 0);
        drop(tx);
    }
}
