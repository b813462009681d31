//! Worker error types
//!
//! Everything here is a broker-level failure. Per-message problems never
//! surface as a `WorkerError`; handlers report them as a `Disposition`.

use thiserror::Error;

/// Broker and session errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Connection could not be opened or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection attempt exceeded the configured timeout
    #[error("Connection attempt timed out after {0} seconds")]
    ConnectTimeout(u64),

    /// Channel, queue declaration or QoS failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// The consumer stream ended (channel or connection closed by the broker)
    #[error("Consumer stream closed")]
    ConsumerClosed,

    /// Acknowledgement could not be delivered to the broker
    #[error("Failed to acknowledge delivery {delivery_tag}: {message}")]
    Ack { delivery_tag: u64, message: String },

    /// Publish or publisher-confirm failure
    #[error("Publish to '{queue}' failed: {message}")]
    Publish { queue: String, message: String },

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid broker configuration (bad URL, missing credentials)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkerError {
    /// Whether the error means the session is gone and a reconnect is needed.
    ///
    /// Configuration errors are the only ones a reconnect cannot fix.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, WorkerError::Config(_) | WorkerError::Serialization(_))
    }
}

impl From<lapin::Error> for WorkerError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannel(_)
            | lapin::Error::InvalidChannelState(_)
            | lapin::Error::ChannelsLimitReached => WorkerError::Channel(err.to_string()),
            _ => WorkerError::Connection(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Serialization(err.to_string())
    }
}
