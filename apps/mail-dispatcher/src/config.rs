//! Dispatcher configuration, read once at startup.

use core_config::{
    env_or_default, BrokerConfig, ConfigError, Environment, FromEnv, SmtpConfig,
};
use email::{SenderIdentity, DEFAULT_CONFIG_DIR, DEFAULT_TEMPLATE_DIR};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub environment: Environment,
    pub broker: BrokerConfig,
    pub smtp: SmtpConfig,
    /// `From` mailbox, validated from SMTP_SENDER and SMTP_SENDER_NAME
    pub sender: SenderIdentity,
    /// Used when a task carries no `email`
    pub default_recipients: Vec<String>,
    pub template_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl FromEnv for DispatcherConfig {
    /// Reads the broker and SMTP sections plus:
    /// - MAIL_RECEPTORS: JSON array or comma-separated list, defaults to empty
    /// - TEMPLATE_DIR / TEMPLATE_CONFIG_DIR: default to src/templates and src/config
    ///
    /// Fails when SMTP_SENDER is not a valid address.
    fn from_env() -> Result<Self, ConfigError> {
        let smtp = SmtpConfig::from_env()?;
        let sender = SenderIdentity::try_from(&smtp).map_err(|e| ConfigError::Invalid {
            key: "SMTP_SENDER".to_string(),
            details: e.to_string(),
        })?;

        Ok(Self {
            environment: Environment::from_env(),
            broker: BrokerConfig::from_env()?,
            smtp,
            sender,
            default_recipients: parse_recipients(&env_or_default("MAIL_RECEPTORS", ""))?,
            template_dir: env_or_default("TEMPLATE_DIR", DEFAULT_TEMPLATE_DIR).into(),
            config_dir: env_or_default("TEMPLATE_CONFIG_DIR", DEFAULT_CONFIG_DIR).into(),
        })
    }
}

/// Parse `MAIL_RECEPTORS`.
///
/// `["a@x.com", "b@x.com"]` and `a@x.com, b@x.com` are both accepted. Blank
/// entries are dropped. A value starting with `[` must be a JSON array of
/// strings.
pub fn parse_recipients(raw: &str) -> Result<Vec<String>, ConfigError> {
    let raw = raw.trim();

    let entries: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
            key: "MAIL_RECEPTORS".to_string(),
            details: e.to_string(),
        })?
    } else {
        raw.split(',').map(str::to_string).collect()
    };

    Ok(entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect())
}
