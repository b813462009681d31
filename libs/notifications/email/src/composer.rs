//! Turns a validated task into a ready-to-send message.

use crate::error::{CompositionError, SenderError};
use crate::task::Task;
use crate::templates::TemplateStore;
use core_config::SmtpConfig;
use lettre::message::Mailbox;
use lettre::Address;
use std::sync::Arc;

/// Who the notification is sent from.
///
/// The display name is stored verbatim; lettre quotes it when the `From`
/// header is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    mailbox: Mailbox,
}

impl SenderIdentity {
    /// Validates `address`. A blank `name` yields a bare-address mailbox.
    pub fn new(name: impl Into<String>, address: impl AsRef<str>) -> Result<Self, SenderError> {
        let address = address.as_ref().trim();
        let parsed: Address = address.parse().map_err(|e: lettre::address::AddressError| {
            SenderError {
                address: address.to_string(),
                details: e.to_string(),
            }
        })?;

        let name = name.into();
        let name = (!name.trim().is_empty()).then(|| name.trim().to_string());

        Ok(Self {
            mailbox: Mailbox::new(name, parsed),
        })
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

impl TryFrom<&SmtpConfig> for SenderIdentity {
    type Error = SenderError;

    fn try_from(config: &SmtpConfig) -> Result<Self, Self::Error> {
        Self::new(config.sender_name.clone(), &config.sender_email)
    }
}

/// A fully rendered notification. Always has at least one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    sender: Mailbox,
    subject: String,
    recipients: Vec<String>,
    body: String,
}

impl ComposedMessage {
    pub fn new(
        sender: Mailbox,
        subject: impl Into<String>,
        recipients: Vec<String>,
        body: impl Into<String>,
    ) -> Result<Self, CompositionError> {
        if recipients.is_empty() {
            return Err(CompositionError::NoRecipients);
        }

        Ok(Self {
            sender,
            subject: subject.into(),
            recipients,
            body: body.into(),
        })
    }

    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Recipients as rendered in the `To` header.
    pub fn to_header(&self) -> String {
        self.recipients.join(", ")
    }

    /// HTML body.
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Resolves templates and fills them in for a task.
pub struct NotificationComposer<S: TemplateStore> {
    store: Arc<S>,
    sender: SenderIdentity,
    default_recipients: Vec<String>,
}

impl<S: TemplateStore> NotificationComposer<S> {
    pub fn new(store: Arc<S>, sender: SenderIdentity) -> Self {
        Self {
            store,
            sender,
            default_recipients: Vec::new(),
        }
    }

    /// Recipients used when a task carries no `email`. Blank entries are dropped.
    pub fn with_default_recipients<I, R>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.default_recipients = recipients
            .into_iter()
            .map(Into::into)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn default_recipients(&self) -> &[String] {
        &self.default_recipients
    }

    pub async fn compose(&self, task: &Task) -> Result<ComposedMessage, CompositionError> {
        let descriptor = self.store.resolve(task.action()).await?;

        let recipients = match task.email() {
            Some(email) => vec![email.to_string()],
            None => self.default_recipients.clone(),
        };

        ComposedMessage::new(
            self.sender.mailbox().clone(),
            descriptor.subject(),
            recipients,
            descriptor.render(task),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::templates::{MockTemplateStore, TemplateDescriptor};

    fn task(payload: &str) -> Task {
        Task::from_payload(payload.as_bytes()).unwrap()
    }

    fn pin_code_store() -> MockTemplateStore {
        let mut store = MockTemplateStore::new();
        store
            .expect_resolve()
            .withf(|action| action == "pin-code")
            .returning(|_| {
                Ok(TemplateDescriptor::new("pin-code", "<p>Hi |name|, PIN |pin|</p>")
                    .with_params(["name", "pin"])
                    .with_fixed("title", "Your PIN"))
            });
        store
    }

    fn sender() -> SenderIdentity {
        SenderIdentity::new("Example", "noreply@example.com").unwrap()
    }

    #[tokio::test]
    async fn test_compose_with_task_email() {
        let composer = NotificationComposer::new(Arc::new(pin_code_store()), sender())
            .with_default_recipients(["ops@example.com"]);

        let message = composer
            .compose(&task(r#"{"action":"pin-code","email":"a@b.com","name":"Ada","pin":1234}"#))
            .await
            .unwrap();

        assert_eq!(message.sender().to_string(), "Example <noreply@example.com>");
        assert_eq!(message.subject(), "Your PIN");
        assert_eq!(message.recipients(), ["a@b.com"]);
        assert_eq!(message.body(), "<p>Hi Ada, PIN 1234</p>");
    }

    #[tokio::test]
    async fn test_compose_falls_back_to_default_recipients() {
        let composer = NotificationComposer::new(Arc::new(pin_code_store()), sender())
            .with_default_recipients(["ops@example.com", " ", "dev@example.com"]);

        let message = composer
            .compose(&task(r#"{"action":"pin-code","pin":"0000"}"#))
            .await
            .unwrap();

        assert_eq!(message.recipients(), ["ops@example.com", "dev@example.com"]);
        assert_eq!(message.to_header(), "ops@example.com, dev@example.com");
        assert_eq!(message.body(), "<p>Hi , PIN 0000</p>");
    }

    #[tokio::test]
    async fn test_compose_without_any_recipient_fails() {
        let composer = NotificationComposer::new(Arc::new(pin_code_store()), sender());

        let err = composer
            .compose(&task(r#"{"action":"pin-code","email":""}"#))
            .await
            .unwrap_err();
        assert_eq!(err, CompositionError::NoRecipients);
    }

    #[tokio::test]
    async fn test_resolution_errors_propagate() {
        let mut store = MockTemplateStore::new();
        store
            .expect_resolve()
            .times(1)
            .returning(|action| Err(ResolveError::ConfigNotFound(action.to_string())));

        let composer = NotificationComposer::new(Arc::new(store), sender());
        let err = composer
            .compose(&task(r#"{"action":"welcome","email":"a@b.com"}"#))
            .await
            .unwrap_err();

        assert_eq!(err, CompositionError::ConfigNotFound("welcome".to_string()));
    }

    #[test]
    fn test_sender_mailbox_without_name() {
        let sender = SenderIdentity::new("  ", "noreply@example.com").unwrap();
        assert_eq!(sender.mailbox().name, None);
        assert_eq!(sender.mailbox().to_string(), "noreply@example.com");
    }

    #[test]
    fn test_sender_name_with_punctuation_is_kept_verbatim() {
        let sender = SenderIdentity::new("Acme, Inc.", "noreply@acme.com").unwrap();
        assert_eq!(sender.mailbox().name.as_deref(), Some("Acme, Inc."));
        assert_eq!(sender.mailbox().email.to_string(), "noreply@acme.com");
        assert_eq!(sender.mailbox().to_string(), "\"Acme, Inc.\" <noreply@acme.com>");
    }

    #[test]
    fn test_invalid_sender_address_is_rejected() {
        let err = SenderIdentity::new("Example", "not an address").unwrap_err();
        assert_eq!(err.address, "not an address");

        assert!(SenderIdentity::new("Example", "").is_err());
    }

    #[test]
    fn test_sender_from_smtp_config() {
        let config = SmtpConfig::new("smtp.example.com", 587, "noreply@acme.com")
            .with_sender_name("Acme, Inc.");
        let sender = SenderIdentity::try_from(&config).unwrap();
        assert_eq!(sender.mailbox().name.as_deref(), Some("Acme, Inc."));
    }

    #[test]
    fn test_composed_message_requires_recipients() {
        let sender: Mailbox = "a@b.com".parse().unwrap();
        assert_eq!(
            ComposedMessage::new(sender, "s", Vec::new(), "b").unwrap_err(),
            CompositionError::NoRecipients
        );
    }
}
