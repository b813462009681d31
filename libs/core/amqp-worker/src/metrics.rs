//! Queue consumer metrics
//!
//! Counters go through the `metrics` facade. Nothing is recorded unless the
//! embedding process installs a recorder. Names are `<service>_<counter>`,
//! with the service name in snake case.

use metrics::counter;

/// Counter helper labelled with the queue name
#[derive(Clone, Debug)]
pub struct QueueMetrics {
    queue: String,
    received: String,
    acknowledged: String,
    dispositions: String,
    reconnects: String,
}

impl QueueMetrics {
    pub fn new(service_name: &str, queue: impl Into<String>) -> Self {
        let prefix = metric_prefix(service_name);
        Self {
            queue: queue.into(),
            received: format!("{prefix}_messages_received_total"),
            acknowledged: format!("{prefix}_messages_acknowledged_total"),
            dispositions: format!("{prefix}_dispositions_total"),
            reconnects: format!("{prefix}_reconnects_total"),
        }
    }

    pub fn message_received(&self) {
        counter!(self.received.clone(), "queue" => self.queue.clone()).increment(1);
    }

    pub fn message_acknowledged(&self) {
        counter!(self.acknowledged.clone(), "queue" => self.queue.clone()).increment(1);
    }

    /// Record the outcome of one message: "completed", "rejected" or "failed"
    pub fn disposition(&self, disposition: &'static str) {
        counter!(
            self.dispositions.clone(),
            "queue" => self.queue.clone(),
            "disposition" => disposition
        )
        .increment(1);
    }

    pub fn reconnect(&self) {
        counter!(self.reconnects.clone(), "queue" => self.queue.clone()).increment(1);
    }
}

fn metric_prefix(service_name: &str) -> String {
    service_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_follow_service_name() {
        let metrics = QueueMetrics::new("mail-dispatcher", "tasks");
        assert_eq!(metrics.received, "mail_dispatcher_messages_received_total");
        assert_eq!(metrics.dispositions, "mail_dispatcher_dispositions_total");

        let metrics = QueueMetrics::new("Billing.Sync", "tasks");
        assert_eq!(metrics.reconnects, "billing_sync_reconnects_total");
    }

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        let metrics = QueueMetrics::new("amqp-worker", "tasks");
        metrics.message_received();
        metrics.disposition("completed");
        metrics.message_acknowledged();
        metrics.reconnect();
    }
}
