//! Worker configuration
//!
//! This module provides `WorkerConfig` for configuring the consumer loop.

use crate::retry::BackoffPolicy;
use core_config::BrokerConfig;
use std::time::Duration;
use uuid::Uuid;

/// Service name used until `with_service_name` is called
pub const DEFAULT_SERVICE_NAME: &str = "amqp-worker";

/// Configuration for the consumer loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Durable queue to consume from
    pub queue_name: String,

    /// Maximum unacknowledged deliveries held by this consumer
    pub prefetch_count: u16,

    /// Fixed pause after a lost connection or an exhausted backoff cycle
    pub retry_interval: Duration,

    /// Backoff for connect + declare within one cycle
    pub backoff: BackoffPolicy,

    /// Consumer tag reported to the broker
    pub consumer_tag: String,

    /// Prefix for the consumer tag and the metric names
    pub service_name: String,
}

impl WorkerConfig {
    /// Create a new WorkerConfig with default settings
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            prefetch_count: 1,
            retry_interval: Duration::from_secs(15),
            backoff: BackoffPolicy::default(),
            consumer_tag: consumer_tag_for(DEFAULT_SERVICE_NAME),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }

    /// Derive the worker settings from the broker section of the configuration
    pub fn from_broker_config(config: &BrokerConfig) -> Self {
        Self {
            queue_name: config.queue_name.clone(),
            prefetch_count: config.prefetch_count,
            retry_interval: config.retry_interval,
            backoff: BackoffPolicy::default().with_max_attempts(config.max_connect_attempts),
            consumer_tag: consumer_tag_for(DEFAULT_SERVICE_NAME),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }

    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Rename the service. Also issues a fresh `<service>-<uuid>` consumer tag,
    /// so call `with_consumer_tag` afterwards to pin one.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self.consumer_tag = consumer_tag_for(&self.service_name);
        self
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }
}

fn consumer_tag_for(service_name: &str) -> String {
    format!("{}-{}", service_name, Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_broker_config() {
        let mut broker = BrokerConfig::new("amqp://u:p@localhost", "notifications")
            .with_prefetch_count(3)
            .with_retry_interval(Duration::from_secs(2));
        broker.max_connect_attempts = 7;

        let config = WorkerConfig::from_broker_config(&broker);
        assert_eq!(config.queue_name, "notifications");
        assert_eq!(config.prefetch_count, 3);
        assert_eq!(config.retry_interval, Duration::from_secs(2));
        assert_eq!(config.backoff.max_attempts, 7);
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert!(config.consumer_tag.starts_with("amqp-worker-"));
    }

    #[test]
    fn test_service_name_drives_consumer_tag() {
        let config = WorkerConfig::new("tasks").with_service_name("billing-sync");
        assert_eq!(config.service_name, "billing-sync");
        assert!(config.consumer_tag.starts_with("billing-sync-"));

        let pinned = WorkerConfig::new("tasks")
            .with_service_name("billing-sync")
            .with_consumer_tag("billing-1");
        assert_eq!(pinned.consumer_tag, "billing-1");
        assert_eq!(pinned.service_name, "billing-sync");
    }

    #[test]
    fn test_consumer_tags_are_unique() {
        let a = WorkerConfig::new("tasks");
        let b = WorkerConfig::new("tasks");
        assert_ne!(a.consumer_tag, b.consumer_tag);
        assert_eq!(a.prefetch_count, 1);
        assert_eq!(a.backoff, BackoffPolicy::default());
    }
}
