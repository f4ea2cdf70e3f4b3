use axum::extract::{Query, State};
use axum::Json;

use retail_core::rbac::Permission;

use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::handlers::Payload;
use crate::services::inventory::MessageResponse;
use crate::services::sales::{
    CreateSaleRequest, SaleIdRequest, SaleQuery, SaleResponse, SalesPage, SalesService,
};
use crate::state::AppState;

/// `GET /api/sales`
pub async fn list(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<Json<SalesPage>> {
    ctx.require(&state, Permission::ViewSales).await?;
    Ok(Json(SalesService::new(state).list().await?))
}

/// `GET /api/sale/get?id=`
pub async fn get(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<SaleQuery>,
) -> ApiResult<Json<SaleResponse>> {
    ctx.require(&state, Permission::ViewSales).await?;
    Ok(Json(SalesService::new(state).get(query).await?))
}

/// `POST /api/sale/create`
pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<CreateSaleRequest>,
) -> ApiResult<Json<SaleResponse>> {
    ctx.require(&state, Permission::ManageSales).await?;
    Ok(Json(SalesService::new(state).create(&ctx, req).await?))
}

/// `POST /api/sale/delete`
pub async fn delete(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<SaleIdRequest>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.require(&state, Permission::ManageSales).await?;
    Ok(Json(SalesService::new(state).delete(req).await?))
}
