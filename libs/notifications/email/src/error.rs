//! Error types for the notification pipeline.
//!
//! Every error here is terminal for one message. None of them reach the
//! consumer loop; the processor turns them into a `Disposition`.

use thiserror::Error;

/// Inbound payload is not a usable task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid payload shape: expected a JSON object, got {0}")]
    InvalidShape(&'static str),

    #[error("Payload has no action")]
    MissingAction,
}

/// Template lookup failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Template not found for action '{0}'")]
    TemplateNotFound(String),

    #[error("Template config not found for action '{0}'")]
    ConfigNotFound(String),

    #[error("Invalid template config for action '{action}': {details}")]
    InvalidConfig { action: String, details: String },

    #[error("Failed to read '{path}': {details}")]
    Io { path: String, details: String },
}

/// A task could not be turned into a sendable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("Template not found for action '{0}'")]
    TemplateNotFound(String),

    #[error("Template config not found for action '{0}'")]
    ConfigNotFound(String),

    #[error("Invalid template config for action '{action}': {details}")]
    InvalidConfig { action: String, details: String },

    #[error("Template store error: {0}")]
    Store(String),

    #[error("No recipients: payload has no email and no default recipients are configured")]
    NoRecipients,
}

impl From<ResolveError> for CompositionError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::TemplateNotFound(action) => CompositionError::TemplateNotFound(action),
            ResolveError::ConfigNotFound(action) => CompositionError::ConfigNotFound(action),
            ResolveError::InvalidConfig { action, details } => {
                CompositionError::InvalidConfig { action, details }
            }
            io @ ResolveError::Io { .. } => CompositionError::Store(io.to_string()),
        }
    }
}

/// Configured sender cannot be used as a `From` mailbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid sender address '{address}': {details}")]
pub struct SenderError {
    pub address: String,
    pub details: String,
}

/// Outbound delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Relay unreachable, refused, timed out or TLS failed
    #[error("SMTP connection failed: {0}")]
    ConnectFailure(String),

    /// Relay answered with a rejection (auth, sender, recipient, data)
    #[error("SMTP server rejected the message: {0}")]
    ProtocolFailure(String),

    /// Message could not be built (unparseable sender or recipient)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Any per-message failure, as reported by `NotificationProcessor::process`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
