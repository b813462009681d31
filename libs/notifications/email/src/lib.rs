//! Queue-driven email notifications
//!
//! Turns task messages of the form `{"action": "...", "email": "...", ...}`
//! into templated HTML emails and hands them to a mail transport.
//!
//! ## Components
//!
//! - **Validation**: `Task::from_payload` / `validate`
//! - **Templates**: `TemplateStore` with `FsTemplateStore` and `InMemoryTemplateStore`
//! - **Composition**: `NotificationComposer` producing a `ComposedMessage`
//! - **Transports**: `SmtpTransport` (lettre), `DryRunTransport` and `RecordingTransport` for tests
//! - **Processing**: `NotificationProcessor`, an `amqp_worker::MessageHandler`
//!
//! ## Usage
//!
//! ```ignore
//! use amqp_worker::{AmqpConnector, ConsumerLoop, WorkerConfig};
//! use email::{FsTemplateStore, NotificationComposer, NotificationProcessor, SmtpTransport};
//!
//! let composer = NotificationComposer::new(Arc::new(FsTemplateStore::default()), sender);
//! let processor = NotificationProcessor::new(composer, Arc::new(SmtpTransport::new(smtp)));
//! let worker = ConsumerLoop::new(AmqpConnector::new(&broker), processor, config);
//! worker.run(shutdown_rx).await?;
//! ```

pub mod composer;
pub mod error;
pub mod processor;
pub mod provider;
pub mod task;
pub mod templates;

pub use composer::{ComposedMessage, NotificationComposer, SenderIdentity};
pub use error::{
    CompositionError, DeliveryError, ProcessingError, ResolveError, SenderError, ValidationError,
};
pub use processor::NotificationProcessor;
pub use provider::{
    DeliveryReceipt, DryRunTransport, MailTransport, RecordingTransport, SmtpTransport,
};
pub use task::{validate, Task};
pub use templates::{
    substitute, FsTemplateStore, InMemoryTemplateStore, TemplateDescriptor, TemplateStore,
    DEFAULT_CONFIG_DIR, DEFAULT_TEMPLATE_DIR,
};
