//! Error types for the back-office API.
//!
//! Every failure leaves a handler as an [`ApiError`]: a stable machine
//! code, the HTTP status it maps to, and a message safe to show a user.
//! Internal failures are logged here and replaced by a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use retail_core::invitation::InvitationState;
use retail_core::{CoreError, ValidationError};
use retail_mail::MailError;
use retail_store::{IdentityError, StoreError};

use crate::session::SessionError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    Unauthenticated,
    InvalidCredentials,
    Forbidden,
    EmailNotConfirmed,
    NotFound,
    Conflict,
    InsufficientStock,
    InvitationExpired,
    InvitationUsed,
    Upstream,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated | ErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden | ErrorCode::EmailNotConfirmed => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict | ErrorCode::InsufficientStock => StatusCode::CONFLICT,
            ErrorCode::InvitationExpired | ErrorCode::InvitationUsed => StatusCode::GONE,
            ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Back-office API error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "Please log in to continue.")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Logs `detail` and returns an error that does not reveal it.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal error");
        Self::new(ErrorCode::Internal, "An internal error occurred")
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    code: ErrorCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: &self.message,
            code: self.code,
        };
        (self.status(), Json(body)).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock { .. } => {
                ApiError::new(ErrorCode::InsufficientStock, err.to_string())
            }
            CoreError::IdSpaceExhausted { .. } => ApiError::new(ErrorCode::Conflict, err.to_string()),
            CoreError::Invitation(state) => invitation_error(state),
            CoreError::Validation(e) => e.into(),
        }
    }
}

fn invitation_error(state: InvitationState) -> ApiError {
    match state {
        InvitationState::Expired => ApiError::new(
            ErrorCode::InvitationExpired,
            "This invitation link has expired. Please contact your administrator.",
        ),
        InvitationState::Accepted => ApiError::new(
            ErrorCode::InvitationUsed,
            "This invitation has already been used.",
        ),
        InvitationState::NoToken | InvitationState::Pending => {
            ApiError::not_found("Invalid invitation link.")
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                ApiError::not_found(format!("{} {} not found", entity, id))
            }
            StoreError::UniqueViolation { .. }
            | StoreError::ForeignKeyViolation { .. }
            | StoreError::Conflict(_) => ApiError::new(ErrorCode::Conflict, err.to_string()),
            StoreError::Core(core) => core.into(),
            StoreError::ConnectionFailed(_) => {
                warn!(error = %err, "Backend unreachable");
                ApiError::new(ErrorCode::Upstream, "The data service is unreachable")
            }
            StoreError::Http { status, .. } if status >= 500 => {
                warn!(error = %err, "Backend failed");
                ApiError::new(ErrorCode::Upstream, "The data service failed")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => {
                ApiError::new(ErrorCode::InvalidCredentials, "Invalid email or password.")
            }
            IdentityError::EmailNotConfirmed => ApiError::new(
                ErrorCode::EmailNotConfirmed,
                "Please confirm your email address before logging in.",
            ),
            IdentityError::AlreadyRegistered => ApiError::new(
                ErrorCode::Conflict,
                "An account with this email already exists.",
            ),
            IdentityError::Network(_) | IdentityError::Provider { .. } => {
                warn!(error = %err, "Identity provider failed");
                ApiError::new(ErrorCode::Upstream, "The sign-in service is unavailable")
            }
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::QueueFull | MailError::DispatcherClosed => {
                ApiError::unavailable(err.to_string())
            }
            MailError::InvalidMessage(_) => ApiError::validation(err.to_string()),
            MailError::Rejected { .. } | MailError::Transport(_) => {
                ApiError::new(ErrorCode::Upstream, err.to_string())
            }
            MailError::InvalidConfig(_) => ApiError::internal(err),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Token(_) => ApiError::unauthenticated(),
            SessionError::Store(_) => {
                warn!(error = %err, "Session store failed");
                ApiError::unavailable("Sessions are temporarily unavailable")
            }
        }
    }
}
