use axum::extract::{Path, State};
use axum::Json;

use crate::error::ApiResult;
use crate::handlers::Payload;
use crate::services::invitations::{AcceptRequest, AcceptResponse, InvitationService, InvitationView};
use crate::state::AppState;

/// `GET /invitation/accept/{token}`
pub async fn inspect(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<InvitationView>> {
    Ok(Json(InvitationService::new(state).inspect(&token).await?))
}

/// `POST /invitation/submit/{token}`
pub async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Payload(req): Payload<AcceptRequest>,
) -> ApiResult<Json<AcceptResponse>> {
    Ok(Json(InvitationService::new(state).accept(&token, req).await?))
}
