//! # Mail Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mail Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Provider     │  │       Dispatch          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Rejected       │  │  QueueFull              │ │
//! │  │  InvalidMessage │  │  Transport      │  │  DispatcherClosed       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

pub type MailResult<T> = Result<T, MailError>;

#[derive(Debug, Error)]
pub enum MailError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid mail configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid email message: {0}")]
    InvalidMessage(String),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// The provider answered with a non-success status.
    #[error("Mail provider rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never got an answer.
    #[error("Mail transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Dispatch Errors
    // =========================================================================
    #[error("Mail queue is full")]
    QueueFull,

    #[error("Mail dispatcher is not running")]
    DispatcherClosed,
}

impl MailError {
    /// Whether another attempt could succeed.
    ///
    /// Throttling and provider-side failures are retried; a 4xx means the
    /// message or credentials are wrong and will stay wrong.
    pub fn is_retryable(&self) -> bool {
        match self {
            MailError::Transport(_) => true,
            MailError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        MailError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(MailError::Transport("reset".into()).is_retryable());
        assert!(MailError::Rejected { status: 503, message: String::new() }.is_retryable());
        assert!(MailError::Rejected { status: 429, message: String::new() }.is_retryable());
        assert!(!MailError::Rejected { status: 401, message: String::new() }.is_retryable());
        assert!(!MailError::QueueFull.is_retryable());
    }
}
