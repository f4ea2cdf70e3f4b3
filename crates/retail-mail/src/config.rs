//! # Mail Configuration
//!
//! The `[mail]` section of the server config.
//!
//! ```toml
//! [mail]
//! provider = "sendgrid"       # sendgrid | resend | log
//! api_key = "SG.xxxx"
//! from_email = "noreply@smartretail.com"
//! from_name = "SmartRetail"
//! max_retries = 2
//! retry_delay_secs = 2
//! queue_capacity = 100
//! ```

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MailError, MailResult};

/// Extra attempts the dispatcher may make after the first send.
pub const MAX_RETRY_LIMIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    #[serde(rename = "sendgrid")]
    SendGrid,
    Resend,
    /// Writes messages to the log instead of sending them.
    #[default]
    Log,
}

impl MailProvider {
    pub fn needs_api_key(&self) -> bool {
        !matches!(self, MailProvider::Log)
    }
}

impl fmt::Display for MailProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailProvider::SendGrid => write!(f, "sendgrid"),
            MailProvider::Resend => write!(f, "resend"),
            MailProvider::Log => write!(f, "log"),
        }
    }
}

impl FromStr for MailProvider {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sendgrid" => Ok(MailProvider::SendGrid),
            "resend" => Ok(MailProvider::Resend),
            "log" | "console" => Ok(MailProvider::Log),
            other => Err(MailError::InvalidConfig(format!(
                "unknown mail provider '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub provider: MailProvider,
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub queue_capacity: usize,
    pub request_timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            provider: MailProvider::Log,
            api_key: String::new(),
            from_email: "noreply@smartretail.com".to_string(),
            from_name: retail_core::COMPANY_NAME.to_string(),
            max_retries: MAX_RETRY_LIMIT,
            retry_delay_secs: 2,
            queue_capacity: 100,
            request_timeout_secs: 15,
        }
    }
}

// api_key stays out of logs.
impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("provider", &self.provider)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("queue_capacity", &self.queue_capacity)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl MailConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> MailResult<()> {
        if self.provider.needs_api_key() && self.api_key.trim().is_empty() {
            return Err(MailError::InvalidConfig(format!(
                "provider '{}' requires mail.api_key",
                self.provider
            )));
        }
        if !self.from_email.contains('@') {
            return Err(MailError::InvalidConfig(format!(
                "from_email '{}' is not an email address",
                self.from_email
            )));
        }
        if self.max_retries > MAX_RETRY_LIMIT {
            return Err(MailError::InvalidConfig(format!(
                "max_retries must be between 0 and {}",
                MAX_RETRY_LIMIT
            )));
        }
        if self.queue_capacity == 0 {
            return Err(MailError::InvalidConfig("queue_capacity must be > 0".into()));
        }
        Ok(())
    }
}
