//! Request-scoped user context.
//!
//! Handlers that need a signed-in user take a [`RequestContext`] argument;
//! the extractor resolves the session cookie and rejects the request with
//! 401 when there is none.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::debug;

use retail_core::rbac::{has_permission, Permission};
use retail_core::types::{sale_user_tag, Role};

use crate::error::{ApiError, ApiResult};
use crate::session::SessionData;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub user: SessionData,
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match state.sessions.resolve(&parts.headers).await? {
            Some(session) => Ok(RequestContext {
                session_id: session.id,
                user: session.data,
            }),
            None => {
                debug!(path = %parts.uri.path(), "Request without a valid session");
                Err(ApiError::unauthenticated())
            }
        }
    }
}

impl RequestContext {
    /// Tag stored on the sales this user records.
    pub fn user_tag(&self) -> String {
        sale_user_tag(&self.user.user_id)
    }

    /// Role of the employee row matching the session email.
    pub async fn role(&self, state: &AppState) -> ApiResult<Option<Role>> {
        Ok(state.backend.employees().role_for_email(&self.user.email).await?)
    }

    /// Refuses the request when permission checks are on and the user's
    /// role lacks `permission`.
    pub async fn require(&self, state: &AppState, permission: Permission) -> ApiResult<()> {
        if !state.config.auth.enforce_permissions {
            return Ok(());
        }
        let role = self.role(state).await?;
        if has_permission(role, permission) {
            Ok(())
        } else {
            debug!(email = %self.user.email, ?role, permission = permission.as_str(), "Permission denied");
            Err(ApiError::forbidden(format!(
                "You do not have permission to {}",
                permission.as_str().replace('_', " ")
            )))
        }
    }
}
