use axum::extract::{Query, State};
use axum::Json;

use retail_core::rbac::Permission;

use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::services::dashboard::{DashboardMetrics, DashboardService};
use crate::services::reports::{ReportQuery, ReportService, SalesReport};
use crate::state::AppState;

/// `GET /api/metrics`
pub async fn metrics(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Json<DashboardMetrics>> {
    ctx.require(&state, Permission::ViewDashboard).await?;
    Ok(Json(DashboardService::new(state).metrics().await?))
}

/// `GET /api/report`
pub async fn report(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<SalesReport>> {
    ctx.require(&state, Permission::ViewReports).await?;
    Ok(Json(ReportService::new(state).report(query).await?))
}
