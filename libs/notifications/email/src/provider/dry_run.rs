//! Transport that logs and discards

use super::{DeliveryReceipt, MailTransport};
use crate::composer::ComposedMessage;
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Logs each message at info level and drops it. Holds nothing but a counter,
/// so it can run for as long as the worker does.
#[derive(Clone, Default)]
pub struct DryRunTransport {
    discarded: Arc<AtomicU64>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MailTransport for DryRunTransport {
    async fn deliver(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let count = self.discarded.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            from = %message.sender(),
            to = %message.to_header(),
            subject = %message.subject(),
            body_bytes = message.body().len(),
            "Dry run, message not sent"
        );

        Ok(DeliveryReceipt {
            transport: self.name(),
            response: format!("250 discarded #{}", count),
        })
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
