//! Mail Dispatcher Service
//!
//! A background worker that turns queued notification tasks into emails.
//!
//! ## Architecture
//!
//! ```text
//! RabbitMQ (durable queue, QUEUE_NAME)
//!   ↓ (manual ack, prefetch bound)
//! ConsumerLoop<AmqpConnector, NotificationProcessor>
//!   ↓ (validates the task, resolves `action`)
//! FsTemplateStore (<action>.html + <action>.yml)
//!   ↓ (renders |placeholders|)
//! SmtpTransport (lettre)
//!   ↓
//! Email Delivery
//! ```
//!
//! Every message is acknowledged once handled, whether or not the email went
//! out. Broker outages are retried with backoff for as long as the process runs.

pub mod config;

use amqp_worker::{
    check_broker_connection, AmqpConnector, AmqpProducer, ConsumerLoop, WorkerConfig,
};
use config::DispatcherConfig;
use core_config::{BrokerConfig, FromEnv};
use email::{
    DryRunTransport, FsTemplateStore, MailTransport, NotificationComposer,
    NotificationProcessor, SmtpTransport, TemplateStore,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Connection name, consumer tag prefix and metric prefix.
const SERVICE_NAME: &str = "mail-dispatcher";
const HEALTHCHECK_ATTEMPTS: u32 = 3;
const HEALTHCHECK_DELAY: Duration = Duration::from_secs(5);

/// Run the dispatcher until SIGINT or SIGTERM.
///
/// With `dry_run` set, composed messages are logged and discarded instead of
/// being handed to the SMTP relay.
pub async fn run(dry_run: bool) -> Result<()> {
    let config = DispatcherConfig::from_env().wrap_err("Invalid configuration")?;

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting mail dispatcher"
    );
    info!("Environment: {:?}", config.environment);
    info!(
        broker = %config.broker.redacted_url(),
        queue = %config.broker.queue_name,
        prefetch = config.broker.prefetch_count,
        smtp_host = %config.smtp.host,
        smtp_port = config.smtp.port,
        sender = %config.sender.mailbox(),
        default_recipients = config.default_recipients.len(),
        "Configuration loaded"
    );

    let store = FsTemplateStore::new(&config.template_dir, &config.config_dir);
    match store.actions().await {
        Ok(actions) => info!(?actions, "Templates available"),
        Err(e) => warn!(error = %e, "Could not list templates"),
    }

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if dry_run {
        info!("Dry run: messages will be logged and discarded, not sent");
        serve(&config, store, DryRunTransport::new(), shutdown_rx).await?;
    } else {
        let transport = SmtpTransport::new(config.smtp.clone());
        serve(&config, store, transport, shutdown_rx).await?;
    }

    info!("Mail dispatcher stopped");
    Ok(())
}

async fn serve<S, T>(
    config: &DispatcherConfig,
    store: S,
    transport: T,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()>
where
    S: TemplateStore + 'static,
    T: MailTransport + 'static,
{
    let composer = NotificationComposer::new(Arc::new(store), config.sender.clone())
        .with_default_recipients(config.default_recipients.iter().cloned());
    let processor = NotificationProcessor::new(composer, Arc::new(transport));

    let worker_config =
        WorkerConfig::from_broker_config(&config.broker).with_service_name(SERVICE_NAME);
    let connector = AmqpConnector::new(&config.broker)
        .with_connection_name(SERVICE_NAME)
        .with_consumer_tag(worker_config.consumer_tag.clone());

    info!(
        queue = %worker_config.queue_name,
        consumer_tag = %worker_config.consumer_tag,
        max_connect_attempts = worker_config.backoff.max_attempts,
        "Worker configuration loaded"
    );

    let worker = ConsumerLoop::new(connector, processor, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .wrap_err("Consumer loop stopped with an unrecoverable error")?;

    let stats = worker.stats();
    info!(
        received = stats.received,
        acknowledged = stats.acknowledged,
        completed = stats.completed,
        rejected = stats.rejected,
        failed = stats.failed,
        connection_cycles = stats.connection_cycles,
        "Consumer statistics"
    );

    Ok(())
}

/// Check that the broker accepts a connection.
pub async fn healthcheck() -> Result<bool> {
    let broker = BrokerConfig::from_env().wrap_err("Invalid broker configuration")?;
    let connector = AmqpConnector::new(&broker).with_connection_name(SERVICE_NAME);

    Ok(check_broker_connection(&connector, HEALTHCHECK_ATTEMPTS, HEALTHCHECK_DELAY).await)
}

/// Publish one JSON task, defaulting to the configured queue.
pub async fn publish(payload: &str, queue: Option<String>) -> Result<()> {
    let message: serde_json::Value =
        serde_json::from_str(payload).wrap_err("Payload is not valid JSON")?;
    if let Err(e) = email::validate(payload.as_bytes()) {
        warn!(error = %e, "Publishing a task the dispatcher will reject");
    }

    let broker = BrokerConfig::from_env().wrap_err("Invalid broker configuration")?;
    let queue = queue.unwrap_or_else(|| broker.queue_name.clone());

    let producer = AmqpProducer::connect(&broker)
        .await
        .wrap_err_with(|| format!("Failed to connect to {}", broker.redacted_url()))?;
    let result = producer.publish(&queue, &message).await;
    producer.close().await;
    result.wrap_err("Failed to publish task")?;

    info!(queue = %queue, "Task published");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
