use crate::{env_or_default, env_parse, env_required, ConfigError, FromEnv};
use std::str::FromStr;
use std::time::Duration;

/// How the SMTP connection is secured
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS (port 587)
    StartTls,
    /// Implicit TLS from the first byte (port 465)
    Tls,
    /// No encryption, for local relays such as Mailpit
    None,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(TlsMode::StartTls),
            "tls" | "ssl" => Ok(TlsMode::Tls),
            "none" | "off" | "false" => Ok(TlsMode::None),
            other => Err(format!("expected starttls, tls or none, got '{}'", other)),
        }
    }
}

/// Outbound SMTP relay configuration.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Empty username disables AUTH
    pub username: String,
    pub password: String,
    pub sender_email: String,
    pub sender_name: String,
    pub tls: TlsMode,
    /// Applies to connect and to every command round trip
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16, sender_email: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
            sender_email: sender_email.into(),
            sender_name: String::new(),
            tls: TlsMode::StartTls,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }

    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

impl FromEnv for SmtpConfig {
    /// Reads:
    /// - SMTP_HOST, SMTP_SENDER: required
    /// - SMTP_PORT: defaults to 587
    /// - SMTP_USERNAME / SMTP_PASSWORD: optional
    /// - SMTP_SENDER_NAME: optional
    /// - SMTP_TLS: starttls (default), tls or none
    /// - SMTP_TIMEOUT_SECS: defaults to 30
    fn from_env() -> Result<Self, ConfigError> {
        let tls = env_or_default("SMTP_TLS", "starttls")
            .parse()
            .map_err(|details| ConfigError::Invalid {
                key: "SMTP_TLS".to_string(),
                details,
            })?;

        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port: env_parse("SMTP_PORT", 587)?,
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            sender_email: env_required("SMTP_SENDER")?,
            sender_name: env_or_default("SMTP_SENDER_NAME", ""),
            tls,
            timeout: Duration::from_secs(env_parse("SMTP_TIMEOUT_SECS", 30)?),
        })
    }
}
