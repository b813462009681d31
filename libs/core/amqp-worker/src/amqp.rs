//! RabbitMQ implementation of the broker seams, on top of `lapin`.

use crate::broker::{BrokerConnector, BrokerSession, Delivery};
use crate::config::DEFAULT_SERVICE_NAME;
use crate::error::WorkerError;
use async_trait::async_trait;
use core_config::BrokerConfig;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::AMQPUri;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use std::time::Duration;
use tracing::debug;

/// Opens `AmqpSession`s against one broker.
#[derive(Clone, Debug)]
pub struct AmqpConnector {
    url: String,
    redacted_url: String,
    connect_timeout: Duration,
    connection_name: String,
    consumer_tag: String,
}

impl AmqpConnector {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            url: config.url.clone(),
            redacted_url: config.redacted_url(),
            connect_timeout: config.connect_timeout,
            connection_name: DEFAULT_SERVICE_NAME.to_string(),
            consumer_tag: format!("{}-{}", DEFAULT_SERVICE_NAME, uuid::Uuid::new_v4()),
        }
    }

    /// Name shown for the connection in the broker's management UI.
    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Open a connection and one channel, bounded by the connect timeout.
    pub(crate) async fn open(&self) -> Result<(Connection, Channel), WorkerError> {
        let uri: AMQPUri = self.url.parse().map_err(WorkerError::Config)?;

        debug!(broker = %self.redacted_url, "Connecting to broker");
        let connect = Connection::connect_uri(
            uri,
            ConnectionProperties::default().with_connection_name(self.connection_name.as_str().into()),
        );
        let connection = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| WorkerError::ConnectTimeout(self.connect_timeout.as_secs()))?
            .map_err(|e| WorkerError::Connection(format!("{}: {}", self.redacted_url, e)))?;

        match connection.create_channel().await {
            Ok(channel) => Ok((connection, channel)),
            Err(e) => {
                let _ = connection.close(200, "channel creation failed").await;
                Err(WorkerError::Channel(format!("channel creation failed: {}", e)))
            }
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    type Session = AmqpSession;

    async fn connect(&self) -> Result<AmqpSession, WorkerError> {
        let (connection, channel) = self.open().await?;
        Ok(AmqpSession {
            connection,
            channel,
            consumer: None,
            consumer_tag: self.consumer_tag.clone(),
        })
    }
}

/// One AMQP connection with a single channel and, once declared, a consumer.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    consumer: Option<Consumer>,
    consumer_tag: String,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn declare(&mut self, queue: &str, prefetch_count: u16) -> Result<(), WorkerError> {
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
            .map_err(|e| WorkerError::Channel(format!("queue '{}' declaration failed: {}", queue, e)))?;

        self.channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| WorkerError::Channel(format!("failed to set QoS: {}", e)))?;

        // no_ack stays false: every delivery waits for an explicit basic_ack
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| WorkerError::Channel(format!("failed to start consumer: {}", e)))?;

        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Delivery, WorkerError> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| WorkerError::Channel("consumer not started".to_string()))?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Delivery {
                delivery_tag: delivery.delivery_tag,
                data: delivery.data,
                redelivered: delivery.redelivered,
            }),
            Some(Err(e)) => Err(e.into()),
            None => Err(WorkerError::ConsumerClosed),
        }
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), WorkerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| WorkerError::Ack {
                delivery_tag,
                message: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<(), WorkerError> {
        self.consumer = None;
        let channel = self.channel.close(200, "Bye").await;
        let connection = self.connection.close(200, "Bye").await;
        channel.and(connection).map_err(WorkerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_a_config_error() {
        let config = BrokerConfig::new("not a url at all", "tasks");
        let connector = AmqpConnector::new(&config);

        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn test_consumer_tag_override() {
        let config = BrokerConfig::new("amqp://u:p@localhost", "tasks");
        let connector = AmqpConnector::new(&config).with_consumer_tag("worker-1");
        assert_eq!(connector.consumer_tag, "worker-1");
    }

    #[test]
    fn test_connection_name_defaults_to_generic_service() {
        let config = BrokerConfig::new("amqp://u:p@localhost", "tasks");

        let connector = AmqpConnector::new(&config);
        assert_eq!(connector.connection_name, "amqp-worker");
        assert!(connector.consumer_tag.starts_with("amqp-worker-"));

        let connector = connector.with_connection_name("billing-sync");
        assert_eq!(connector.connection_name, "billing-sync");
    }
}
