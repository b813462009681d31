//! NotificationProcessor - the message handler plugged into the consumer loop
//!
//! Runs validate → compose → deliver for one payload and turns the outcome
//! into a `Disposition`. Data problems (bad payload, unknown action, no
//! recipients) are `Rejected`; transport problems are `Failed`. Either way
//! the loop acknowledges the message.

use crate::composer::NotificationComposer;
use crate::error::ProcessingError;
use crate::provider::{DeliveryReceipt, MailTransport};
use crate::task::Task;
use crate::templates::TemplateStore;
use amqp_worker::{Disposition, MessageHandler};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Sends one notification per inbound task
pub struct NotificationProcessor<S: TemplateStore, T: MailTransport> {
    composer: NotificationComposer<S>,
    transport: Arc<T>,
}

impl<S: TemplateStore, T: MailTransport> NotificationProcessor<S, T> {
    pub fn new(composer: NotificationComposer<S>, transport: Arc<T>) -> Self {
        Self {
            composer,
            transport,
        }
    }

    pub fn composer(&self) -> &NotificationComposer<S> {
        &self.composer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Full pipeline for a raw payload.
    pub async fn process(&self, payload: &[u8]) -> Result<DeliveryReceipt, ProcessingError> {
        let task = Task::from_payload(payload)?;
        debug!(action = %task.action(), "Processing task");

        let message = self.composer.compose(&task).await?;
        let receipt = self.transport.deliver(&message).await?;

        info!(
            action = %task.action(),
            to = %message.to_header(),
            subject = %message.subject(),
            transport = receipt.transport,
            response = %receipt.response,
            "Email sent successfully"
        );

        Ok(receipt)
    }
}

#[async_trait]
impl<S, T> MessageHandler for NotificationProcessor<S, T>
where
    S: TemplateStore + 'static,
    T: MailTransport + 'static,
{
    async fn handle(&self, payload: &[u8]) -> Disposition {
        match self.process(payload).await {
            Ok(_) => Disposition::Completed,
            Err(e @ ProcessingError::Validation(_)) => {
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Discarding invalid message"
                );
                Disposition::rejected(e.to_string())
            }
            Err(e @ ProcessingError::Composition(_)) => {
                warn!(error = %e, "Discarding message that cannot be composed");
                Disposition::rejected(e.to_string())
            }
            Err(e @ ProcessingError::Delivery(_)) => {
                error!(error = %e, transport = self.transport.name(), "Email delivery failed");
                Disposition::failed(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "notification_processor"
    }
}
