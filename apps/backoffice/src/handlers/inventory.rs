use axum::extract::{Query, State};
use axum::Json;

use retail_core::rbac::Permission;

use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::handlers::Payload;
use crate::services::inventory::{
    AddStockRequest, AddStockResponse, InventoryList, InventoryQuery, InventoryService,
    MessageResponse, ProductIdRequest, ProductResponse, UpdateProductRequest,
};
use crate::state::AppState;

/// `GET /api/products`
pub async fn list(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Json<InventoryList>> {
    ctx.require(&state, Permission::ViewInventory).await?;
    Ok(Json(InventoryService::new(state).list(query).await?))
}

/// `POST /api/stock/add`
pub async fn add_stock(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<AddStockRequest>,
) -> ApiResult<Json<AddStockResponse>> {
    ctx.require(&state, Permission::ManageInventory).await?;
    Ok(Json(InventoryService::new(state).add_stock(req).await?))
}

/// `POST /api/product/update`
pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<UpdateProductRequest>,
) -> ApiResult<Json<ProductResponse>> {
    ctx.require(&state, Permission::ManageInventory).await?;
    Ok(Json(InventoryService::new(state).update_product(req).await?))
}

/// `POST /api/product/delete`
pub async fn delete(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(req): Payload<ProductIdRequest>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.require(&state, Permission::ManageInventory).await?;
    Ok(Json(InventoryService::new(state).delete_product(req).await?))
}
