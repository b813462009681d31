//! Mail transport implementations

pub mod dry_run;
pub mod mock;
pub mod smtp;

pub use dry_run::DryRunTransport;
pub use mock::RecordingTransport;
pub use smtp::SmtpTransport;

use crate::composer::ComposedMessage;
use crate::error::DeliveryError;
use async_trait::async_trait;

/// Result of a successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Transport that delivered the message
    pub transport: &'static str,
    /// Relay response, e.g. `250 2.0.0 Ok: queued`
    pub response: String,
}

/// Delivers composed messages over an outbound mail protocol
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver one message. No internal retry.
    async fn deliver(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, DeliveryError>;

    /// Get transport name
    fn name(&self) -> &'static str;
}
