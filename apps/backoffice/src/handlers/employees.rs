use axum::extract::{Path, Query, State};
use axum::Json;

use retail_core::rbac::Permission;

use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::handlers::Payload;
use crate::services::employees::{
    AddEmployeeResponse, DeliveryStatusResponse, EmployeeIdRequest, EmployeeList, EmployeeQuery,
    EmployeeRequest, EmployeeService, ResendResponse,
};
use crate::services::inventory::MessageResponse;
use crate::state::AppState;

/// `GET /api/employees`
pub async fn list(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<EmployeeQuery>,
) -> ApiResult<Json<EmployeeList>> {
    ctx.require(&state, Permission::ViewEmployees).await?;
    Ok(Json(EmployeeService::new(state).list(query).await?))
}

/// `POST /api/employee/add`
pub async fn add(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<EmployeeRequest>,
) -> ApiResult<Json<AddEmployeeResponse>> {
    ctx.require(&state, Permission::ManageEmployees).await?;
    Ok(Json(EmployeeService::new(state).add(req).await?))
}

/// `POST /api/employee/update`
pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<EmployeeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.require(&state, Permission::ManageEmployees).await?;
    Ok(Json(EmployeeService::new(state).update(req).await?))
}

/// `POST /api/employee/delete`
pub async fn delete(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<EmployeeIdRequest>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.require(&state, Permission::ManageEmployees).await?;
    Ok(Json(EmployeeService::new(state).delete(req).await?))
}

/// `POST /api/employee/resend-invitation`
pub async fn resend_invitation(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<EmployeeIdRequest>,
) -> ApiResult<Json<ResendResponse>> {
    ctx.require(&state, Permission::ManageEmployees).await?;
    Ok(Json(EmployeeService::new(state).resend_invitation(req).await?))
}

/// `GET /api/employee/invitation-status/{delivery_id}`
pub async fn invitation_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(delivery_id): Path<String>,
) -> ApiResult<Json<DeliveryStatusResponse>> {
    ctx.require(&state, Permission::ViewEmployees).await?;
    Ok(Json(EmployeeService::new(state).delivery_status(&delivery_id).await?))
}
