//! # Mail Providers
//!
//! Every provider sits behind [`Mailer`]; the server picks one at startup
//! from `mail.provider`.
//!
//! ```text
//!   MailConfig.provider
//!         │
//!         ├── "sendgrid" ──► SendGridMailer ── POST /v3/mail/send
//!         ├── "resend"   ──► ResendMailer   ── POST /emails
//!         └── "log"      ──► LogMailer      ── tracing::info!
//! ```
//!
//! [`RecordingMailer`] keeps sent messages in memory and can be scripted
//! to fail, for tests of anything that sends mail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{MailConfig, MailProvider};
use crate::error::{MailError, MailResult};
use crate::message::EmailMessage;

pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";
pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Longest provider error body kept in a `Rejected` error.
const MAX_ERROR_BODY: usize = 300;

/// Proof that a provider accepted a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub provider: &'static str,
    pub message_id: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    fn now(provider: &'static str, message_id: Option<String>) -> Self {
        DeliveryReceipt {
            provider,
            message_id,
            accepted_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    async fn send(&self, message: &EmailMessage) -> MailResult<DeliveryReceipt>;

    fn provider_name(&self) -> &'static str;
}

/// Builds the mailer selected by `config.provider`.
pub fn build_mailer(config: &MailConfig) -> MailResult<Arc<dyn Mailer>> {
    config.validate()?;
    let sender = Sender {
        email: config.from_email.clone(),
        name: config.from_name.clone(),
    };

    let mailer: Arc<dyn Mailer> = match config.provider {
        MailProvider::SendGrid => Arc::new(SendGridMailer::new(
            http_client(config)?,
            &config.api_key,
            sender,
        )),
        MailProvider::Resend => {
            Arc::new(ResendMailer::new(http_client(config)?, &config.api_key, sender))
        }
        MailProvider::Log => Arc::new(LogMailer::new(sender)),
    };
    info!(provider = mailer.provider_name(), from = %config.from_email, "Mailer ready");
    Ok(mailer)
}

fn http_client(config: &MailConfig) -> MailResult<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| MailError::InvalidConfig(format!("http client: {}", e)))
}

/// Turns a non-success provider answer into `Rejected`.
async fn rejection(response: reqwest::Response) -> MailError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let mut message: String = body.chars().take(MAX_ERROR_BODY).collect();
    if message.is_empty() {
        message = format!("HTTP {}", status);
    }
    MailError::Rejected { status, message }
}

// =============================================================================
// Sender
// =============================================================================

#[derive(Debug, Clone)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

impl Sender {
    /// `Name <email>`, or the bare address when there is no name.
    pub fn mailbox(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

// =============================================================================
// SendGrid
// =============================================================================

#[derive(Clone)]
pub struct SendGridMailer {
    http: Client,
    api_key: String,
    sender: Sender,
    endpoint: String,
}

impl fmt::Debug for SendGridMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridMailer")
            .field("sender", &self.sender)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl SendGridMailer {
    pub fn new(http: Client, api_key: &str, sender: Sender) -> Self {
        SendGridMailer {
            http,
            api_key: api_key.to_string(),
            sender,
            endpoint: SENDGRID_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn payload(&self, message: &EmailMessage) -> serde_json::Value {
        let mut content = Vec::new();
        if !message.text.is_empty() {
            content.push(json!({ "type": "text/plain", "value": message.text }));
        }
        if !message.html.is_empty() {
            content.push(json!({ "type": "text/html", "value": message.html }));
        }
        json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": self.sender.email, "name": self.sender.name },
            "subject": message.subject,
            "content": content,
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, message: &EmailMessage) -> MailResult<DeliveryReceipt> {
        message.validate()?;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(to = %message.to, ?message_id, "SendGrid accepted message");
        Ok(DeliveryReceipt::now(self.provider_name(), message_id))
    }

    fn provider_name(&self) -> &'static str {
        "sendgrid"
    }
}

// =============================================================================
// Resend
// =============================================================================

#[derive(Clone)]
pub struct ResendMailer {
    http: Client,
    api_key: String,
    sender: Sender,
    endpoint: String,
}

impl fmt::Debug for ResendMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResendMailer")
            .field("sender", &self.sender)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

impl ResendMailer {
    pub fn new(http: Client, api_key: &str, sender: Sender) -> Self {
        ResendMailer {
            http,
            api_key: api_key.to_string(),
            sender,
            endpoint: RESEND_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn payload(&self, message: &EmailMessage) -> serde_json::Value {
        json!({
            "from": self.sender.mailbox(),
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> MailResult<DeliveryReceipt> {
        message.validate()?;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body: ResendResponse = response
            .json()
            .await
            .unwrap_or(ResendResponse { id: None });
        debug!(to = %message.to, message_id = ?body.id, "Resend accepted message");
        Ok(DeliveryReceipt::now(self.provider_name(), body.id))
    }

    fn provider_name(&self) -> &'static str {
        "resend"
    }
}

// =============================================================================
// Log
// =============================================================================

/// Development mailer: logs the message and reports success.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: Sender,
}

impl LogMailer {
    pub fn new(sender: Sender) -> Self {
        LogMailer { sender }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> MailResult<DeliveryReceipt> {
        message.validate()?;
        info!(
            from = %self.sender.mailbox(),
            to = %message.to,
            subject = %message.subject,
            "Email (log provider)\n{}",
            message.text
        );
        Ok(DeliveryReceipt::now(
            self.provider_name(),
            Some(Uuid::new_v4().to_string()),
        ))
    }

    fn provider_name(&self) -> &'static str {
        "log"
    }
}

// =============================================================================
// Recording
// =============================================================================

/// In-memory mailer with scripted failures.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    script: Arc<Mutex<VecDeque<MailError>>>,
    attempts: Arc<Mutex<usize>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error for the next send attempt. Queued errors are used
    /// in order before any send succeeds again.
    pub fn fail_next(&self, error: MailError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(error);
        }
    }

    /// Messages that were accepted.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Every call to `send`, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|a| *a).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> MailResult<DeliveryReceipt> {
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }
        message.validate()?;

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Transport("recording mailer poisoned".into()))?;
        sent.push(message.clone());
        Ok(DeliveryReceipt::now(
            self.provider_name(),
            Some(format!("rec-{}", sent.len())),
        ))
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Sender {
        Sender {
            email: "noreply@smartretail.com".into(),
            name: "SmartRetail".into(),
        }
    }

    fn message() -> EmailMessage {
        EmailMessage {
            to: "aina@example.com".into(),
            subject: "Hello".into(),
            html: "<p>Hi</p>".into(),
            text: "Hi".into(),
        }
    }

    #[test]
    fn test_sendgrid_payload() {
        let mailer = SendGridMailer::new(Client::new(), "SG.key", sender());
        let payload = mailer.payload(&message());

        assert_eq!(payload["personalizations"][0]["to"][0]["email"], "aina@example.com");
        assert_eq!(payload["from"]["email"], "noreply@smartretail.com");
        assert_eq!(payload["content"][0]["type"], "text/plain");
        assert_eq!(payload["content"][1]["type"], "text/html");
        assert!(!format!("{:?}", mailer).contains("SG.key"));
    }

    #[test]
    fn test_resend_payload() {
        let mailer = ResendMailer::new(Client::new(), "re_key", sender());
        let payload = mailer.payload(&message());

        assert_eq!(payload["from"], "SmartRetail <noreply@smartretail.com>");
        assert_eq!(payload["to"][0], "aina@example.com");
        assert_eq!(payload["text"], "Hi");
    }

    #[test]
    fn test_build_mailer_follows_config() {
        let mailer = build_mailer(&MailConfig::default()).unwrap();
        assert_eq!(mailer.provider_name(), "log");

        let config = MailConfig {
            provider: MailProvider::SendGrid,
            api_key: "SG.key".into(),
            ..MailConfig::default()
        };
        assert_eq!(build_mailer(&config).unwrap().provider_name(), "sendgrid");

        let missing_key = MailConfig {
            provider: MailProvider::SendGrid,
            ..MailConfig::default()
        };
        assert!(build_mailer(&missing_key).is_err());
    }

    #[tokio::test]
    async fn test_log_mailer_accepts() {
        let receipt = LogMailer::new(sender()).send(&message()).await.unwrap();
        assert_eq!(receipt.provider, "log");
        assert!(receipt.message_id.is_some());
    }

    #[tokio::test]
    async fn test_recording_mailer_script() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(MailError::Transport("down".into()));

        assert!(mailer.send(&message()).await.is_err());
        mailer.send(&message()).await.unwrap();

        assert_eq!(mailer.attempts(), 2);
        assert_eq!(mailer.sent().len(), 1);
    }
}
