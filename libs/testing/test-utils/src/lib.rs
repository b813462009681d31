//! Shared test utilities for the worker crates
//!
//! - `ScriptedBroker`: in-memory `BrokerConnector` that plays back a script of
//!   connection outcomes and deliveries, and records what the consumer did
//!   (always available)
//! - `TestRabbitMq`: RabbitMQ container with automatic cleanup (feature: "rabbitmq")
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::{ScriptedBroker, SessionScript};
//!
//! let broker = ScriptedBroker::new()
//!     .refuse("connection refused")
//!     .session(SessionScript::new().deliver(br#"{"action":"pin-code"}"#));
//!
//! let worker = ConsumerLoop::new(broker.clone(), handler, config);
//! ```

mod scripted;

#[cfg(feature = "rabbitmq")]
mod rabbitmq;

pub use scripted::{BrokerEvent, ScriptedBroker, ScriptedSession, SessionScript};

#[cfg(feature = "rabbitmq")]
pub use rabbitmq::TestRabbitMq;

/// Poll `condition` until it holds, yielding to the runtime in between.
///
/// Works with a paused clock: each sleep lets time auto-advance once every
/// task is idle.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
