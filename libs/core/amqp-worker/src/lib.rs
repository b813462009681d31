//! AMQP Worker Framework
//!
//! A small consumer framework for durable RabbitMQ queues.
//!
//! ## Features
//!
//! - **Consumer loop**: `ConsumerLoop<C, H>` drives connect → declare → consume → ack
//! - **Bounded reconnect**: exponential backoff per cycle, fixed pause between cycles
//! - **Manual acknowledgement**: a delivery is acked only after its handler returns
//! - **Panic isolation**: handlers run in their own task
//! - **Metrics**: counters through the `metrics` facade
//! - **Health check**: one-shot broker connectivity probe
//!
//! ## Example
//!
//! ```ignore
//! use amqp_worker::{AmqpConnector, ConsumerLoop, WorkerConfig};
//!
//! let connector = AmqpConnector::new(&broker_config);
//! let worker = ConsumerLoop::new(connector, handler, WorkerConfig::from_broker_config(&broker_config));
//! worker.run(shutdown_rx).await?;
//! ```

mod amqp;
mod broker;
mod config;
mod error;
mod health;
pub mod metrics;
mod producer;
mod retry;
mod worker;

pub use amqp::{AmqpConnector, AmqpSession};
pub use broker::{BrokerConnector, BrokerSession, Delivery};
pub use config::{WorkerConfig, DEFAULT_SERVICE_NAME};
pub use error::WorkerError;
pub use health::check_broker_connection;
pub use metrics::QueueMetrics;
pub use producer::AmqpProducer;
pub use retry::{retry_with_backoff, wait_for_shutdown, BackoffPolicy, RetryError};
pub use worker::{ConsumerLoop, ConsumerState, ConsumerStats, Disposition, MessageHandler};
