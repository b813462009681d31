//! Queue producer for publishing tasks.
//!
//! Used by the `publish` command to enqueue test messages.
//!
//! # Example
//!
//! ```rust,ignore
//! use amqp_worker::AmqpProducer;
//!
//! let producer = AmqpProducer::connect(&broker_config).await?;
//! producer.publish("tasks", &serde_json::json!({"action": "pin-code"})).await?;
//! producer.close().await;
//! ```

use crate::amqp::AmqpConnector;
use crate::error::WorkerError;
use core_config::BrokerConfig;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection};
use serde::Serialize;
use tracing::{debug, warn};

/// Publishes persistent JSON messages with publisher confirms.
pub struct AmqpProducer {
    connection: Connection,
    channel: Channel,
}

impl AmqpProducer {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, WorkerError> {
        let (connection, channel) = AmqpConnector::new(config).open().await?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| WorkerError::Channel(format!("failed to enable confirms: {}", e)))?;

        Ok(Self {
            connection,
            channel,
        })
    }

    /// Declare `queue` durable and publish `message` to it as JSON.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        queue: &str,
        message: &T,
    ) -> Result<(), WorkerError> {
        let bytes = serde_json::to_vec(message)?;
        let publish_error = |message: String| WorkerError::Publish {
            queue: queue.to_string(),
            message,
        };

        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| publish_error(format!("queue declaration failed: {}", e)))?;

        let confirmation = self
            .channel
            .basic_publish(
                "",    // Default exchange
                queue, // Routing key = queue name
                BasicPublishOptions::default(),
                &bytes,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| publish_error(e.to_string()))?
            .await
            .map_err(|e| publish_error(format!("confirmation failed: {}", e)))?;

        if confirmation.is_nack() {
            return Err(publish_error("broker rejected the message".to_string()));
        }

        debug!(queue, bytes = bytes.len(), "Message published");
        Ok(())
    }

    pub async fn close(self) {
        if let Err(e) = self.channel.close(200, "Bye").await {
            warn!(error = %e, "Failed to close producer channel");
        }
        if let Err(e) = self.connection.close(200, "Bye").await {
            warn!(error = %e, "Failed to close producer connection");
        }
    }
}
