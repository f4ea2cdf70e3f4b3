//! Employee service: roster, profile edits and invitation email.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use retail_core::invitation::InvitationToken;
use retail_core::types::{Employee, EmployeeStatus, NewEmployee, Role};
use retail_core::validation::{require, validate_email, validate_profile_picture};
use retail_mail::{DeliveryRecord, InvitationEmail, MailError};
use retail_store::EmployeeChanges;

use crate::error::{ApiError, ApiResult};
use crate::services::inventory::MessageResponse;
use crate::state::AppState;

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EmployeeQuery {
    pub role: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmployeeList {
    pub employees: Vec<Employee>,
    pub selected_role: Option<Role>,
    pub search_query: String,
    pub role_counts: BTreeMap<&'static str, usize>,
    pub total_employees: usize,
}

/// Body of both add and update. `id` and `current_profile_picture` are
/// only read by update.
#[derive(Debug, Default, Deserialize)]
pub struct EmployeeRequest {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub current_profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeIdRequest {
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    NotQueued,
}

#[derive(Debug, Serialize)]
pub struct AddEmployeeResponse {
    pub success: bool,
    pub message: String,
    pub employee_id: String,
    pub name: String,
    pub email_status: EmailStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ResendResponse {
    pub success: bool,
    pub message: String,
    pub email_sent: bool,
}

#[derive(Debug, Serialize)]
pub struct DeliveryStatusResponse {
    pub success: bool,
    pub delivery: DeliveryRecord,
}

/// Trimmed, validated profile fields shared by add and update.
#[derive(Debug)]
struct Profile {
    name: String,
    email: String,
    role: Role,
    phone: Option<String>,
    position: Option<String>,
    address: Option<String>,
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn validate_profile(req: &EmployeeRequest) -> ApiResult<Profile> {
    let name = require("name", req.name.as_deref())?;
    let email = require("email", req.email.as_deref())?;
    let role: Role = require("role", req.role.as_deref())?.parse()?;
    validate_email(email)?;

    Ok(Profile {
        name: name.to_string(),
        email: email.to_string(),
        role,
        phone: optional(req.phone.as_deref()),
        position: optional(req.position.as_deref()),
        address: optional(req.address.as_deref()),
    })
}

/// A non-empty picture must be an image data URL within the size limit.
fn validate_picture(picture: Option<&str>) -> ApiResult<Option<String>> {
    match optional(picture) {
        Some(data_url) => {
            let size = validate_profile_picture(&data_url)?;
            tracing::debug!(bytes = size, "Profile picture accepted");
            Ok(Some(data_url))
        }
        None => Ok(None),
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct EmployeeService {
    state: AppState,
}

impl EmployeeService {
    pub fn new(state: AppState) -> Self {
        EmployeeService { state }
    }

    pub async fn list(&self, query: EmployeeQuery) -> ApiResult<EmployeeList> {
        let role = match optional(query.role.as_deref()) {
            Some(raw) => Some(raw.parse::<Role>()?),
            None => None,
        };
        let search = query.search.unwrap_or_default().trim().to_string();

        let repo = self.state.backend.employees();
        let all = repo.list(None, None).await?;
        let employees = if role.is_some() || !search.is_empty() {
            repo.list(role, Some(&search)).await?
        } else {
            all.clone()
        };

        let mut role_counts: BTreeMap<&'static str, usize> =
            Role::ALL.iter().map(|r| (r.as_str(), 0)).collect();
        for employee in &all {
            *role_counts.entry(employee.role.as_str()).or_default() += 1;
        }

        Ok(EmployeeList {
            employees,
            selected_role: role,
            search_query: search,
            role_counts,
            total_employees: all.len(),
        })
    }

    /// Creates a pending employee and queues the invitation email.
    ///
    /// The employee is kept even when the email cannot be queued; resend
    /// is available from the roster.
    pub async fn add(&self, req: EmployeeRequest) -> ApiResult<AddEmployeeResponse> {
        let profile = validate_profile(&req)?;
        let profile_picture = validate_picture(req.profile_picture.as_deref())?;

        let repo = self.state.backend.employees();
        if repo.email_taken(&profile.email, None).await? {
            return Err(ApiError::validation("Email already exists"));
        }

        let token = InvitationToken::generate();
        let now = Utc::now();
        let employee = repo
            .create(&NewEmployee {
                name: profile.name,
                email: profile.email,
                phone: profile.phone,
                position: profile.position,
                address: profile.address,
                profile_picture,
                role: profile.role,
                status: EmployeeStatus::Pending,
                invitation_token: Some(token.as_str().to_string()),
                invitation_sent_at: Some(now),
                hire_date: Some(now.date_naive()),
            })
            .await?;

        let message = self.invitation_email(&employee, token.as_str());
        let (email_status, delivery_id) = match self.state.mail.enqueue(message).await {
            Ok(delivery) => (EmailStatus::Queued, Some(delivery.id)),
            Err(err @ (MailError::QueueFull | MailError::DispatcherClosed)) => {
                warn!(
                    employee_id = %employee.employee_id,
                    error = %err,
                    "Invitation email not queued, resend required"
                );
                (EmailStatus::NotQueued, None)
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            employee_id = %employee.employee_id,
            role = %employee.role,
            email_status = ?email_status,
            "Employee added"
        );

        Ok(AddEmployeeResponse {
            success: true,
            message: "Employee added successfully".to_string(),
            employee_id: employee.employee_id,
            name: employee.name,
            email_status,
            delivery_id,
        })
    }

    pub async fn update(&self, req: EmployeeRequest) -> ApiResult<MessageResponse> {
        let id = req
            .id
            .ok_or_else(|| ApiError::validation("Employee ID is required"))?;
        let profile = validate_profile(&req)?;

        let repo = self.state.backend.employees();
        repo.get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Employee not found"))?;

        if repo.email_taken(&profile.email, Some(id)).await? {
            return Err(ApiError::validation("Email already exists"));
        }

        let profile_picture = match validate_picture(req.profile_picture.as_deref())? {
            Some(picture) => Some(picture),
            None => optional(req.current_profile_picture.as_deref()),
        };

        let updated = repo
            .update(
                id,
                &EmployeeChanges {
                    name: profile.name,
                    email: profile.email,
                    role: profile.role,
                    phone: req.phone.as_deref().map(|p| optional(Some(p))),
                    position: req.position.as_deref().map(|p| optional(Some(p))),
                    address: profile.address,
                    profile_picture,
                },
            )
            .await?;

        info!(employee_id = %updated.employee_id, "Employee updated");
        Ok(MessageResponse::ok("Employee updated successfully"))
    }

    pub async fn delete(&self, req: EmployeeIdRequest) -> ApiResult<MessageResponse> {
        let id = req
            .id
            .ok_or_else(|| ApiError::validation("Employee ID is required"))?;
        let repo = self.state.backend.employees();
        let employee = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Employee not found"))?;

        repo.delete(id).await?;
        Ok(MessageResponse::ok(format!(
            "Employee {} deleted successfully",
            employee.name
        )))
    }

    /// Issues a fresh token and sends the invitation, waiting for the
    /// provider's answer.
    pub async fn resend_invitation(&self, req: EmployeeIdRequest) -> ApiResult<ResendResponse> {
        let id = req
            .id
            .ok_or_else(|| ApiError::validation("Employee ID is required"))?;
        let repo = self.state.backend.employees();
        let employee = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Employee not found"))?;

        if employee.invitation().ensure_resendable(employee.status).is_err() {
            return Err(ApiError::validation("Employee has already accepted invitation"));
        }
        let email = employee
            .email
            .clone()
            .ok_or_else(|| ApiError::validation("Employee has no email address"))?;

        let token = InvitationToken::generate();
        let employee = repo.set_invitation(id, token.as_str(), Utc::now()).await?;

        let message = self.invitation_email(&employee, token.as_str());
        match self.state.mail.send_and_wait(message).await {
            Ok(receipt) => {
                info!(employee_id = %employee.employee_id, provider = receipt.provider, "Invitation resent");
                Ok(ResendResponse {
                    success: true,
                    message: format!("Invitation email resent to {}", email),
                    email_sent: true,
                })
            }
            Err(err) => {
                warn!(employee_id = %employee.employee_id, error = %err, "Invitation resend failed");
                Err(err.into())
            }
        }
    }

    pub async fn delivery_status(&self, delivery_id: &str) -> ApiResult<DeliveryStatusResponse> {
        let id = Uuid::parse_str(delivery_id.trim())
            .map_err(|_| ApiError::validation("Invalid delivery ID"))?;
        let delivery = self
            .state
            .mail
            .status(id)
            .await
            .ok_or_else(|| ApiError::not_found("Delivery not found"))?;
        Ok(DeliveryStatusResponse {
            success: true,
            delivery,
        })
    }

    fn invitation_email(&self, employee: &Employee, token: &str) -> retail_mail::EmailMessage {
        InvitationEmail {
            name: &employee.name,
            email: employee.email.as_deref().unwrap_or_default(),
            employee_id: &employee.employee_id,
            role: employee.role,
            token,
            app_url: &self.state.config.server.app_url,
            expiry_hours: self.state.config.invitation.expiry_hours,
        }
        .build()
    }
}
