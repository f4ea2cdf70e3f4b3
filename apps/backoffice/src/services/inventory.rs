//! Inventory service: product list, stock intake, edits and deletes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use retail_core::stock::StockLevels;
use retail_core::types::{NewProduct, Product, StockStatus};
use retail_core::validation::{require, validate_non_negative, validate_quantity};
use retail_core::{Money, ValidationError, DEFAULT_LOW_STOCK_THRESHOLD, DEFAULT_MAX_STOCK};
use retail_store::Row;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct StatusCounts {
    pub out_of_stock: usize,
    pub low_stock: usize,
    pub high_stock: usize,
    pub completed: usize,
}

impl StatusCounts {
    fn tally(products: &[Product]) -> Self {
        let mut counts = StatusCounts::default();
        for product in products {
            match product.levels().status() {
                StockStatus::OutOfStock => counts.out_of_stock += 1,
                StockStatus::LowStock => counts.low_stock += 1,
                StockStatus::HighStock => counts.high_stock += 1,
                StockStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Serialize)]
pub struct InventoryList {
    pub products: Vec<Product>,
    pub categories: Vec<String>,
    pub selected_category: Option<String>,
    pub search_query: String,
    /// Products per category, over the whole catalogue.
    pub product_counts: BTreeMap<String, usize>,
    pub status_counts: StatusCounts,
    pub total_products: usize,
}

#[derive(Debug, Deserialize)]
pub struct AddStockRequest {
    #[serde(default)]
    pub is_new: bool,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct AddStockResponse {
    pub success: bool,
    pub message: String,
    pub product_id: String,
    pub new_stock: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<Money>,
    pub current_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub success: bool,
    pub message: String,
    pub product: Product,
}

#[derive(Debug, Deserialize)]
pub struct ProductIdRequest {
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        MessageResponse {
            success: true,
            message: message.into(),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct InventoryService {
    state: AppState,
}

impl InventoryService {
    pub fn new(state: AppState) -> Self {
        InventoryService { state }
    }

    pub async fn list(&self, query: InventoryQuery) -> ApiResult<InventoryList> {
        let repo = self.state.backend.products();
        let category = query.category.filter(|c| !c.trim().is_empty());
        let search = query.search.unwrap_or_default().trim().to_string();

        let all = repo.list(None, None).await?;
        let products = if category.is_some() || !search.is_empty() {
            repo.list(category.as_deref(), Some(&search)).await?
        } else {
            all.clone()
        };

        let categories = repo.categories().await?;
        let mut product_counts: BTreeMap<String, usize> =
            categories.iter().map(|c| (c.clone(), 0)).collect();
        for product in &all {
            *product_counts.entry(product.category.clone()).or_default() += 1;
        }

        Ok(InventoryList {
            status_counts: StatusCounts::tally(&all),
            total_products: all.len(),
            products,
            categories,
            selected_category: category,
            search_query: search,
            product_counts,
        })
    }

    /// Receives stock for an existing product, or creates a new product
    /// holding the received quantity.
    pub async fn add_stock(&self, req: AddStockRequest) -> ApiResult<AddStockResponse> {
        validate_quantity("quantity", req.quantity)?;
        let repo = self.state.backend.products();

        if req.is_new {
            let name = require("product_name", req.product_name.as_deref())?;
            let category = require("category", req.category.as_deref())?;
            let levels =
                StockLevels::new(req.quantity, DEFAULT_MAX_STOCK, DEFAULT_LOW_STOCK_THRESHOLD);

            let product = repo
                .create(&NewProduct {
                    name: name.to_string(),
                    category: category.to_string(),
                    price: Money::zero(),
                    current_stock: req.quantity,
                    max_stock: DEFAULT_MAX_STOCK,
                    low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
                    status: levels.status(),
                })
                .await?;

            return Ok(AddStockResponse {
                success: true,
                message: "New product created successfully".to_string(),
                product_id: product.product_id,
                new_stock: product.current_stock,
            });
        }

        let product_id = require("product_id", req.product_id.as_deref())?;
        let product = repo
            .get_by_product_id(product_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Product not found"))?;

        let adjustment = repo.adjust_stock(&product, req.quantity).await?;
        info!(
            product_id,
            added = req.quantity,
            new_stock = adjustment.after,
            "Stock received"
        );

        Ok(AddStockResponse {
            success: true,
            message: format!("Added {} units to {}", req.quantity, product.name),
            product_id: product.product_id,
            new_stock: adjustment.after,
        })
    }

    pub async fn update_product(&self, req: UpdateProductRequest) -> ApiResult<ProductResponse> {
        let product_id = require("product_id", req.product_id.as_deref())?;
        let repo = self.state.backend.products();
        let product = repo
            .get_by_product_id(product_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Product not found"))?;

        let mut changes = Row::new();
        if let Some(name) = req.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            changes.insert("name".into(), Value::from(name));
        }
        if let Some(category) = req.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            changes.insert("category".into(), Value::from(category));
        }
        if let Some(price) = req.price {
            if price.is_negative() {
                return Err(ValidationError::Negative {
                    field: "price".to_string(),
                }
                .into());
            }
            changes.insert("price".into(), serde_json::to_value(price).map_err(ApiError::internal)?);
        }

        let stock_fields = [
            ("current_stock", req.current_stock),
            ("max_stock", req.max_stock),
            ("low_stock_threshold", req.low_stock_threshold),
        ];
        for (field, value) in stock_fields {
            if let Some(value) = value {
                validate_non_negative(field, value)?;
                changes.insert(field.into(), Value::from(value));
            }
        }

        if changes.is_empty() {
            return Err(ValidationError::NothingToUpdate.into());
        }

        if stock_fields.iter().any(|(_, v)| v.is_some()) {
            let levels = StockLevels::new(
                req.current_stock.unwrap_or(product.current_stock),
                req.max_stock.unwrap_or(product.max_stock),
                req.low_stock_threshold.unwrap_or(product.low_stock_threshold),
            );
            changes.insert("status".into(), Value::from(levels.status().as_str()));
        }

        let updated = repo.update_fields(product_id, changes).await?;
        info!(product_id, status = updated.status.as_str(), "Product updated");

        Ok(ProductResponse {
            success: true,
            message: "Product updated successfully".to_string(),
            product: updated,
        })
    }

    pub async fn delete_product(&self, req: ProductIdRequest) -> ApiResult<MessageResponse> {
        let product_id = require("product_id", req.product_id.as_deref())?;
        let repo = self.state.backend.products();
        let product = repo
            .get_by_product_id(product_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Product not found"))?;

        repo.delete(product_id).await?;
        Ok(MessageResponse::ok(format!(
            "Product {} deleted successfully",
            product.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::testing::{memory_state, product};
    use retail_mail::RecordingMailer;

    #[tokio::test]
    async fn test_add_stock_new_product() {
        let memory = memory_state(&RecordingMailer::new());
        let service = InventoryService::new(memory.state.clone());

        let response = service
            .add_stock(AddStockRequest {
                is_new: true,
                product_id: None,
                product_name: Some("Green Tea".into()),
                category: Some("Beverages".into()),
                quantity: 5,
            })
            .await
            .unwrap();

        assert_eq!(response.product_id, "#1000");
        assert_eq!(response.new_stock, 5);

        let stored = memory
            .state
            .backend
            .products()
            .get_by_product_id("#1000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, StockStatus::LowStock);
        assert_eq!(stored.max_stock, 50);
        assert_eq!(stored.price, Money::zero());
    }

    #[tokio::test]
    async fn test_add_stock_existing_recomputes_status() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 8).await;
        let service = InventoryService::new(memory.state.clone());

        let response = service
            .add_stock(AddStockRequest {
                is_new: false,
                product_id: Some(tea.product_id.clone()),
                product_name: None,
                category: None,
                quantity: 45,
            })
            .await
            .unwrap();

        assert_eq!(response.new_stock, 53);
        let stored = memory
            .state
            .backend
            .products()
            .get_by_product_id(&tea.product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, StockStatus::HighStock);
    }

    #[tokio::test]
    async fn test_add_stock_validation() {
        let memory = memory_state(&RecordingMailer::new());
        let service = InventoryService::new(memory.state.clone());

        let err = service
            .add_stock(AddStockRequest {
                is_new: false,
                product_id: Some("#1000".into()),
                product_name: None,
                category: None,
                quantity: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);

        let err = service
            .add_stock(AddStockRequest {
                is_new: false,
                product_id: Some("#1999".into()),
                product_name: None,
                category: None,
                quantity: 3,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = service
            .add_stock(AddStockRequest {
                is_new: true,
                product_id: None,
                product_name: Some("Mystery".into()),
                category: None,
                quantity: 3,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn test_update_product() {
        let memory = memory_state(&RecordingMailer::new());
        let pen = product(&memory, "Ballpoint Pen", "Stationery", 120, 30).await;
        let service = InventoryService::new(memory.state.clone());

        let response = service
            .update_product(UpdateProductRequest {
                product_id: Some(pen.product_id.clone()),
                price: Some(Money::from_cents(150)),
                current_stock: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.product.price, Money::from_cents(150));
        assert_eq!(response.product.current_stock, 0);
        assert_eq!(response.product.status, StockStatus::OutOfStock);
    }

    #[tokio::test]
    async fn test_update_product_rejections() {
        let memory = memory_state(&RecordingMailer::new());
        let pen = product(&memory, "Ballpoint Pen", "Stationery", 120, 30).await;
        let service = InventoryService::new(memory.state.clone());

        let err = service
            .update_product(UpdateProductRequest {
                product_id: Some(pen.product_id.clone()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.message, "No data to update");

        let err = service
            .update_product(UpdateProductRequest {
                product_id: Some(pen.product_id.clone()),
                max_stock: Some(-1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);

        let err = service
            .update_product(UpdateProductRequest {
                product_id: Some("#4999".into()),
                name: Some("Pencil".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_list_filters_and_counts() {
        let memory = memory_state(&RecordingMailer::new());
        product(&memory, "Green Tea", "Beverages", 350, 0).await;
        product(&memory, "Soy Milk", "Beverages", 280, 25).await;
        product(&memory, "Glue Stick", "Stationery", 200, 60).await;
        let service = InventoryService::new(memory.state.clone());

        let list = service
            .list(InventoryQuery {
                category: Some("Beverages".into()),
                search: Some("milk".into()),
            })
            .await
            .unwrap();

        assert_eq!(list.products.len(), 1);
        assert_eq!(list.products[0].name, "Soy Milk");
        assert_eq!(list.total_products, 3);
        assert_eq!(list.product_counts["Beverages"], 2);
        assert_eq!(list.categories, vec!["Beverages", "Stationery"]);
        assert_eq!(list.status_counts.out_of_stock, 1);
        assert_eq!(list.status_counts.high_stock, 1);
        assert_eq!(list.status_counts.completed, 1);
    }

    #[tokio::test]
    async fn test_delete_product() {
        let memory = memory_state(&RecordingMailer::new());
        let pen = product(&memory, "Ballpoint Pen", "Stationery", 120, 30).await;
        let service = InventoryService::new(memory.state.clone());

        let response = service
            .delete_product(ProductIdRequest {
                product_id: Some(pen.product_id.clone()),
            })
            .await
            .unwrap();
        assert_eq!(response.message, "Product Ballpoint Pen deleted successfully");

        let err = service
            .delete_product(ProductIdRequest {
                product_id: Some(pen.product_id),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
