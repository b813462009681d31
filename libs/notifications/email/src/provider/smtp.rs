//! SMTP transport using lettre

use super::{DeliveryReceipt, MailTransport};
use crate::composer::ComposedMessage;
use crate::error::DeliveryError;
use async_trait::async_trait;
use core_config::{SmtpConfig, TlsMode};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::debug;

/// SMTP relay transport.
///
/// A fresh lettre transport is built for every delivery and dropped when the
/// call returns, so no relay connection outlives a single attempt.
#[derive(Clone)]
pub struct SmtpTransport {
    config: Arc<SmtpConfig>,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let config = &self.config;

        let builder = match config.tls {
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| DeliveryError::ConnectFailure(format!("TLS setup failed: {}", e)))?,
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| DeliveryError::ConnectFailure(format!("TLS setup failed: {}", e)))?,
            // No TLS (for Mailpit/Mailhog)
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let builder = builder.port(config.port).timeout(Some(config.timeout));

        let builder = if config.has_credentials() {
            builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
        } else {
            builder
        };

        Ok(builder.build())
    }

    pub(crate) fn build_message(message: &ComposedMessage) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(message.sender().clone())
            .subject(message.subject());

        for recipient in message.recipients() {
            let to: Mailbox = recipient.parse().map_err(|e| {
                DeliveryError::InvalidMessage(format!("invalid recipient '{}': {}", recipient, e))
            })?;
            builder = builder.to(to);
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(message.body().to_string())
            .map_err(|e| DeliveryError::InvalidMessage(e.to_string()))
    }
}

/// Map a lettre error onto the delivery failure classes.
///
/// A reply from the relay (4xx/5xx) is a protocol failure; everything that
/// happened before a reply could be read counts as a connect failure.
fn classify(error: SmtpError) -> DeliveryError {
    if error.is_permanent() || error.is_transient() || error.is_response() {
        DeliveryError::ProtocolFailure(error.to_string())
    } else {
        DeliveryError::ConnectFailure(error.to_string())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let email = Self::build_message(message)?;
        let transport = self.build_transport()?;

        debug!(
            host = %self.config.host,
            port = self.config.port,
            to = %message.to_header(),
            "Delivering via SMTP"
        );

        let response = transport.send(email).await.map_err(classify)?;

        let text = response.message().collect::<Vec<_>>().join(" ");
        Ok(DeliveryReceipt {
            transport: self.name(),
            response: format!("{} {}", response.code(), text).trim_end().to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::SenderIdentity;
    use lettre::message::{header, Mailboxes};
    use std::time::Duration;

    fn message_from(name: &str, recipients: &[&str]) -> ComposedMessage {
        let sender = SenderIdentity::new(name, "noreply@example.com").unwrap();
        ComposedMessage::new(
            sender.mailbox().clone(),
            "Your PIN",
            recipients.iter().map(|r| r.to_string()).collect(),
            "<p>1234</p>",
        )
        .unwrap()
    }

    fn message(recipients: &[&str]) -> ComposedMessage {
        message_from("", recipients)
    }

    #[test]
    fn test_build_message_headers() {
        let email =
            SmtpTransport::build_message(&message_from("Example", &["a@example.com", "b@example.com"]))
                .unwrap();

        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("From: Example <noreply@example.com>"));
        assert!(raw.contains("Subject: Your PIN"));
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
    }

    #[test]
    fn test_invalid_recipient_is_invalid_message() {
        let err = SmtpTransport::build_message(&message(&["not an address"])).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidMessage(ref m) if m.contains("not an address")));
    }

    #[test]
    fn test_sender_names_with_specials_are_quoted() {
        for name in ["Acme, Inc.", "O'Brien (Ops)", "Team: Alerts"] {
            let email = SmtpTransport::build_message(&message_from(name, &["a@example.com"]))
                .unwrap_or_else(|e| panic!("sender name {name:?} was rejected: {e}"));

            let from = email
                .headers()
                .get::<header::From>()
                .map(Mailboxes::from)
                .and_then(Mailboxes::into_single)
                .unwrap();
            assert_eq!(from.name.as_deref(), Some(name));
            assert_eq!(from.email.to_string(), "noreply@example.com");

            let raw = String::from_utf8(email.formatted()).unwrap();
            assert!(
                raw.contains(&format!("\"{name}\" <noreply@example.com>")),
                "unquoted From header for {name:?}:\n{raw}"
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_connect_failure() {
        let mut config = SmtpConfig::new("127.0.0.1", 1, "noreply@example.com").with_tls(TlsMode::None);
        config.timeout = Duration::from_secs(2);
        let transport = SmtpTransport::new(config);

        let err = transport
            .deliver(&message(&["a@example.com"]))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::ConnectFailure(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_invalid_message_is_reported_before_connecting() {
        let transport = SmtpTransport::new(
            SmtpConfig::new("127.0.0.1", 1, "noreply@example.com").with_tls(TlsMode::None),
        );

        let err = transport
            .deliver(&message(&["nope"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidMessage(_)));
    }

    #[test]
    fn test_transport_name() {
        let transport = SmtpTransport::new(SmtpConfig::new("localhost", 1025, "a@b.com"));
        assert_eq!(transport.name(), "smtp");
        assert_eq!(transport.config().port, 1025);
    }
}
