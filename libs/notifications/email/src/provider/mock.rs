//! In-memory transport that records what it was asked to send

use super::{DeliveryReceipt, MailTransport};
use crate::composer::ComposedMessage;
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Transport that captures messages instead of sending them.
///
/// Keeps every message in memory, so it is meant for tests. Clones share the
/// same record.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<ComposedMessage>>>,
    failure: Option<DeliveryError>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects every delivery with `error`
    pub fn failing(error: DeliveryError) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failure: Some(error),
        }
    }

    pub async fn sent(&self) -> Vec<ComposedMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }

    /// Whether any recorded message lists `address` as a recipient
    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent
            .lock()
            .await
            .iter()
            .any(|m| m.recipients().iter().any(|r| r == address))
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, DeliveryError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let mut sent = self.sent.lock().await;
        sent.push(message.clone());

        Ok(DeliveryReceipt {
            transport: self.name(),
            response: format!("250 recorded #{}", sent.len()),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> ComposedMessage {
        ComposedMessage::new(
            "noreply@example.com".parse().unwrap(),
            "Test Subject",
            vec![to.to_string()],
            "<p>Body</p>",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_recording_transport_records() {
        let transport = RecordingTransport::new();

        let receipt = transport.deliver(&message("test@example.com")).await.unwrap();
        assert_eq!(receipt.transport, "recording");
        assert_eq!(receipt.response, "250 recorded #1");

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients(), ["test@example.com"]);
    }

    #[tokio::test]
    async fn test_failing_transport_records_nothing() {
        let transport =
            RecordingTransport::failing(DeliveryError::ConnectFailure("Simulated failure".into()));

        let err = transport.deliver(&message("test@example.com")).await.unwrap_err();
        assert!(err.to_string().contains("Simulated failure"));
        assert_eq!(transport.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_was_sent_to_and_shared_clones() {
        let transport = RecordingTransport::new();
        let handle = transport.clone();

        transport.deliver(&message("user@example.com")).await.unwrap();

        assert!(handle.was_sent_to("user@example.com").await);
        assert!(!handle.was_sent_to("other@example.com").await);

        handle.clear().await;
        assert_eq!(transport.sent_count().await, 0);
    }
}
