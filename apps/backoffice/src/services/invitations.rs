//! # Invitation Acceptance
//!
//! A new employee follows the mailed link, picks a password and gets a
//! sign-in account.
//!
//! ```text
//! GET  /invitation/accept/{token}   → state + who the invitation is for
//! POST /invitation/submit/{token}   → password checks
//!                                   → account (admin create, email confirmed)
//!                                      or self signup when allowed
//!                                   → employee active, token cleared
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use retail_core::invitation::InvitationState;
use retail_core::types::{Employee, Role};
use retail_core::validation::validate_new_password;
use retail_store::{AuthUser, NewAccount};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AcceptRequest {
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvitedEmployee {
    pub employee_id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

impl From<&Employee> for InvitedEmployee {
    fn from(employee: &Employee) -> Self {
        InvitedEmployee {
            employee_id: employee.employee_id.clone(),
            name: employee.name.clone(),
            email: employee.email.clone(),
            role: employee.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvitationView {
    pub success: bool,
    pub invitation_valid: bool,
    pub state: InvitationState,
    pub employee: InvitedEmployee,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub success: bool,
    pub message: String,
    pub employee_id: String,
    pub email_confirmation_required: bool,
}

pub struct InvitationService {
    state: AppState,
}

impl InvitationService {
    pub fn new(state: AppState) -> Self {
        InvitationService { state }
    }

    async fn find(&self, token: &str) -> ApiResult<Employee> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::not_found("Invalid invitation link."));
        }
        self.state
            .backend
            .employees()
            .get_by_token(token)
            .await?
            .ok_or_else(|| ApiError::not_found("Invalid invitation link."))
    }

    pub async fn inspect(&self, token: &str) -> ApiResult<InvitationView> {
        let employee = self.find(token).await?;
        let expiry = self.state.invitation_expiry();
        let invitation = employee.invitation();
        let state = invitation.state(Utc::now(), expiry);

        Ok(InvitationView {
            success: true,
            invitation_valid: state == InvitationState::Pending,
            state,
            expires_at: invitation.expires_at(expiry),
            employee: InvitedEmployee::from(&employee),
        })
    }

    pub async fn accept(&self, token: &str, req: AcceptRequest) -> ApiResult<AcceptResponse> {
        let employee = self.find(token).await?;
        let now = Utc::now();
        employee
            .invitation()
            .ensure_acceptable(now, self.state.invitation_expiry())?;

        let password = req.password.unwrap_or_default();
        validate_new_password(&password, req.confirm_password.as_deref().unwrap_or(""))?;

        let email = employee
            .email
            .clone()
            .ok_or_else(|| ApiError::validation("Employee has no email address"))?;
        let account = NewAccount {
            email,
            password,
            metadata: json!({
                "name": employee.name,
                "role": employee.role,
                "employee_id": employee.employee_id,
            }),
        };

        let user = self.create_account(&employee, &account).await?;

        let marked = self
            .state
            .backend
            .employees()
            .mark_accepted(employee.id, token.trim(), now)
            .await;
        let accepted = match marked {
            Ok(Some(accepted)) => accepted,
            Ok(None) => {
                warn!(
                    employee_id = %employee.employee_id,
                    user_id = %user.user_id,
                    email = %user.email,
                    "Invitation already used; identity account left without an employee"
                );
                return Err(ApiError::new(
                    ErrorCode::InvitationUsed,
                    "This invitation has already been used.",
                ));
            }
            Err(err) => {
                warn!(
                    employee_id = %employee.employee_id,
                    user_id = %user.user_id,
                    email = %user.email,
                    error = %err,
                    "Could not mark invitation accepted; identity account left without an employee"
                );
                return Err(err.into());
            }
        };

        info!(
            employee_id = %accepted.employee_id,
            email_confirmed = user.email_confirmed,
            "Invitation accepted"
        );

        let message = if user.email_confirmed {
            "Registration complete! You can now login with your credentials."
        } else {
            "Registration complete! Please confirm your email address before logging in."
        };
        Ok(AcceptResponse {
            success: true,
            message: message.to_string(),
            employee_id: accepted.employee_id,
            email_confirmation_required: !user.email_confirmed,
        })
    }

    /// Creates the sign-in account with the email pre-confirmed, or falls
    /// back to self signup when configured to.
    async fn create_account(&self, employee: &Employee, account: &NewAccount) -> ApiResult<AuthUser> {
        if let Some(admin) = &self.state.identity.admin {
            return Ok(admin.create_user(account, true).await?);
        }

        if !self.state.config.invitation.allow_self_signup_fallback {
            warn!(
                employee_id = %employee.employee_id,
                "No identity admin client and self-signup fallback disabled"
            );
            return Err(ApiError::unavailable(
                "Account creation is not available. Please contact your administrator.",
            ));
        }

        warn!(
            employee_id = %employee.employee_id,
            "No identity admin client, using self signup; email confirmation may be required"
        );
        Ok(self.state.identity.provider.sign_up(account).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::config;
    use crate::state::MemoryState;
    use chrono::Duration;
    use retail_core::invitation::InvitationToken;
    use retail_core::types::{EmployeeStatus, NewEmployee};
    use retail_mail::RecordingMailer;
    use retail_store::memory::Op;
    use retail_store::{IdentityProvider, Table};
    use std::sync::Arc;

    async fn invite(memory: &MemoryState, email: &str, sent_at: DateTime<Utc>) -> (Employee, String) {
        let token = InvitationToken::generate().into_string();
        let employee = memory
            .state
            .backend
            .employees()
            .create(&NewEmployee {
                name: "Aina Rahman".into(),
                email: email.into(),
                phone: None,
                position: None,
                address: None,
                profile_picture: None,
                role: Role::Sales,
                status: EmployeeStatus::Pending,
                invitation_token: Some(token.clone()),
                invitation_sent_at: Some(sent_at),
                hire_date: None,
            })
            .await
            .unwrap();
        (employee, token)
    }

    fn accept_request(password: &str) -> AcceptRequest {
        AcceptRequest {
            password: Some(password.into()),
            confirm_password: Some(password.into()),
        }
    }

    fn build(with_admin: bool, fallback: bool) -> MemoryState {
        let mut config = config();
        config.invitation.allow_self_signup_fallback = fallback;
        MemoryState::build(config, Arc::new(RecordingMailer::new()), with_admin)
    }

    #[tokio::test]
    async fn test_accept_activates_employee() {
        let memory = build(true, false);
        let (employee, token) = invite(&memory, "aina@shop.example.com", Utc::now()).await;
        let service = InvitationService::new(memory.state.clone());

        let view = service.inspect(&token).await.unwrap();
        assert!(view.invitation_valid);
        assert_eq!(view.employee.employee_id, "S0001");

        let response = service.accept(&token, accept_request("Secret123")).await.unwrap();
        assert!(!response.email_confirmation_required);

        let stored = memory
            .state
            .backend
            .employees()
            .get_by_id(employee.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, EmployeeStatus::Active);
        assert!(stored.invitation_token.is_none());
        assert!(stored.invitation_accepted_at.is_some());

        let session = memory
            .state
            .identity
            .provider
            .sign_in_with_password("aina@shop.example.com", "Secret123")
            .await
            .unwrap();
        assert_eq!(session.email, "aina@shop.example.com");
        let metadata = memory.identity.metadata("aina@shop.example.com").await.unwrap();
        assert_eq!(metadata["employee_id"], "S0001");

        // The token is gone, so the link no longer resolves.
        let err = service.inspect(&token).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_expired_invitation() {
        let memory = build(true, false);
        let sent_at = Utc::now() - Duration::hours(49);
        let (_, token) = invite(&memory, "aina@shop.example.com", sent_at).await;
        let service = InvitationService::new(memory.state.clone());

        let view = service.inspect(&token).await.unwrap();
        assert!(!view.invitation_valid);
        assert_eq!(view.state, InvitationState::Expired);

        let err = service.accept(&token, accept_request("Secret123")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvitationExpired);
    }

    #[tokio::test]
    async fn test_password_rules() {
        let memory = build(true, false);
        let (_, token) = invite(&memory, "aina@shop.example.com", Utc::now()).await;
        let service = InvitationService::new(memory.state.clone());

        for password in ["", "short1A", "alllowercase1", "NoDigitsHere"] {
            let err = service.accept(&token, accept_request(password)).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::Validation, "{:?}", password);
        }

        let err = service
            .accept(
                &token,
                AcceptRequest {
                    password: Some("Secret123".into()),
                    confirm_password: Some("Secret124".into()),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let memory = build(true, false);
        let service = InvitationService::new(memory.state.clone());
        let err = service.accept("nope", accept_request("Secret123")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Invalid invitation link.");
    }

    #[tokio::test]
    async fn test_without_admin_client_needs_fallback() {
        let memory = build(false, false);
        let (employee, token) = invite(&memory, "aina@shop.example.com", Utc::now()).await;
        let service = InvitationService::new(memory.state.clone());

        let err = service.accept(&token, accept_request("Secret123")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unavailable);

        let stored = memory
            .state
            .backend
            .employees()
            .get_by_id(employee.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, EmployeeStatus::Pending);
    }

    #[tokio::test]
    async fn test_self_signup_fallback_is_reported() {
        let memory = build(false, true);
        let (_, token) = invite(&memory, "aina@shop.example.com", Utc::now()).await;
        let service = InvitationService::new(memory.state.clone());

        let response = service.accept(&token, accept_request("Secret123")).await.unwrap();
        assert!(response.email_confirmation_required);

        let err = memory
            .state
            .identity
            .provider
            .sign_in_with_password("aina@shop.example.com", "Secret123")
            .await
            .unwrap_err();
        assert!(matches!(err, retail_store::IdentityError::EmailNotConfirmed));
    }

    #[tokio::test]
    async fn test_failed_activation_keeps_invitation_open() {
        let memory = build(true, false);
        let (employee, token) = invite(&memory, "aina@shop.example.com", Utc::now()).await;
        let service = InvitationService::new(memory.state.clone());

        memory.tables.fail_next(Op::Update, Table::Employees).await;
        let err = service
            .accept(&token, accept_request("Welcome123"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Upstream);

        // The account exists, the employee is still pending.
        let session = memory
            .identity
            .sign_in_with_password("aina@shop.example.com", "Welcome123")
            .await
            .unwrap();
        assert_eq!(session.email, "aina@shop.example.com");
        let stored = memory
            .state
            .backend
            .employees()
            .get_by_id(employee.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, EmployeeStatus::Pending);
        assert_eq!(stored.invitation_token.as_deref(), Some(token.as_str()));
    }
}
