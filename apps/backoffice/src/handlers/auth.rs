use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::handlers::Payload;
use crate::services::auth::{AuthService, LoginRequest, MeResponse};
use crate::state::AppState;

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    Payload(req): Payload<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = AuthService::new(state).login(req).await?;
    Ok(([(SET_COOKIE, outcome.set_cookie)], Json(outcome.response)))
}

/// `POST /logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let cleared = state.sessions.end(&headers).await?;
    Ok((
        [(SET_COOKIE, cleared)],
        Json(json!({ "success": true, "message": "You have been logged out." })),
    ))
}

/// `GET /api/me`
pub async fn me(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<Json<MeResponse>> {
    Ok(Json(AuthService::new(state).me(&ctx).await?))
}
