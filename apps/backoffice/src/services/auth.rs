//! Sign-in, sign-out and the current user.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use retail_core::rbac::{permissions_for, Permission};
use retail_core::types::Role;

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub email: String,
}

/// A successful login and the `Set-Cookie` value that carries it.
#[derive(Debug)]
pub struct LoginOutcome {
    pub response: LoginResponse,
    pub set_cookie: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub user_id: String,
    pub email: String,
    pub role: Option<Role>,
    pub permissions: Vec<Permission>,
}

pub struct AuthService {
    state: AppState,
}

impl AuthService {
    pub fn new(state: AppState) -> Self {
        AuthService { state }
    }

    pub async fn login(&self, req: LoginRequest) -> ApiResult<LoginOutcome> {
        let email = req.email.as_deref().map(str::trim).unwrap_or("");
        let password = req.password.as_deref().unwrap_or("");
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::validation("Email and password are required."));
        }

        let auth = match self
            .state
            .identity
            .provider
            .sign_in_with_password(email, password)
            .await
        {
            Ok(auth) => auth,
            Err(err) => {
                warn!(email, error = %err, "Login failed");
                return Err(err.into());
            }
        };

        let email = auth.email.clone();
        let set_cookie = self.state.sessions.start(auth).await?;
        info!(email = %email, "User logged in");

        Ok(LoginOutcome {
            response: LoginResponse {
                success: true,
                message: "Login successful".to_string(),
                email,
            },
            set_cookie,
        })
    }

    pub async fn me(&self, ctx: &RequestContext) -> ApiResult<MeResponse> {
        let role = ctx.role(&self.state).await?;
        let permissions = role
            .map(|r| permissions_for(r).to_vec())
            .unwrap_or_default();

        Ok(MeResponse {
            success: true,
            user_id: ctx.user.user_id.clone(),
            email: ctx.user.email.clone(),
            role,
            permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::testing::memory_state;
    use axum::http::{header, HeaderMap, HeaderValue};
    use retail_mail::RecordingMailer;
    use retail_store::{IdentityAdmin, NewAccount};

    async fn register(memory: &crate::state::MemoryState, email: &str, password: &str) {
        memory
            .identity
            .create_user(
                &NewAccount {
                    email: email.into(),
                    password: password.into(),
                    metadata: serde_json::json!({}),
                },
                true,
            )
            .await
            .unwrap();
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    #[tokio::test]
    async fn test_login_starts_session() {
        let memory = memory_state(&RecordingMailer::new());
        register(&memory, "owner@shop.example.com", "Secret123").await;
        let service = AuthService::new(memory.state.clone());

        let outcome = service
            .login(login("owner@shop.example.com", "Secret123"))
            .await
            .unwrap();
        assert!(outcome.set_cookie.starts_with("smartretail_session="));
        assert!(outcome.set_cookie.contains("HttpOnly"));

        let cookie = outcome.set_cookie.split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        let session = memory.state.sessions.resolve(&headers).await.unwrap().unwrap();
        assert_eq!(session.data.email, "owner@shop.example.com");
    }

    #[tokio::test]
    async fn test_login_errors() {
        let memory = memory_state(&RecordingMailer::new());
        register(&memory, "owner@shop.example.com", "Secret123").await;
        let service = AuthService::new(memory.state.clone());

        let err = service.login(login("", "Secret123")).await.unwrap_err();
        assert_eq!(err.message, "Email and password are required.");

        let err = service
            .login(login("owner@shop.example.com", "Wrong1234"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCredentials);
        assert_eq!(err.message, "Invalid email or password.");
    }

    #[tokio::test]
    async fn test_me_reports_role_permissions() {
        let memory = memory_state(&RecordingMailer::new());
        let service = AuthService::new(memory.state.clone());
        let ctx = crate::services::testing::context("nobody@shop.example.com");

        let me = service.me(&ctx).await.unwrap();
        assert_eq!(me.role, None);
        assert!(me.permissions.is_empty());
    }
}
