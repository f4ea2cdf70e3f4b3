//! # Sales Service
//!
//! Point-of-sale transactions. A sale touches three tables, so every write
//! step records how to undo itself.
//!
//! ## Create / Delete Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create                              delete                             │
//! │                                                                         │
//! │  validate + resolve products         fetch sale + items                 │
//! │       │   (404 / 409 before writes)       │                             │
//! │       ▼                                   ▼                             │
//! │  insert sale ──► undo: delete sale   restore stock ──► undo: take back  │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  per item:                           delete items ──► undo: re-insert   │
//! │    insert item ──► undo: delete item      │                             │
//! │    stock -= qty ──► undo: give back       ▼                             │
//! │                                      delete sale                        │
//! │                                                                         │
//! │  Any failure: replay the undo steps newest first, return the error.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

use retail_core::types::{
    NewSale, NewSaleItem, PaymentMethod, Product, Sale, SaleItem, SaleStatus,
};
use retail_core::validation::validate_quantity;
use retail_core::{CoreError, Money, ValidationError};
use retail_store::{Backend, StoreResult};

use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::services::inventory::MessageResponse;
use crate::state::AppState;

/// Sales shown on the sales page.
pub const RECENT_SALES_LIMIT: u32 = 50;

const UNKNOWN_PRODUCT: &str = "Unknown Product";

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub subtotal: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub payment_method: Option<String>,
    #[serde(default)]
    pub total_amount: Money,
    #[serde(default)]
    pub items: Vec<SaleLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct SaleIdRequest {
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaleQuery {
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaleLineView {
    pub product_name: String,
    pub quantity: i64,
    pub subtotal: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
}

#[derive(Debug, Serialize)]
pub struct SaleView {
    pub id: i64,
    pub sale_id: String,
    pub user_id: Option<String>,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub sales_date: DateTime<Utc>,
    pub items: Vec<SaleLineView>,
}

impl SaleView {
    fn new(sale: Sale, items: Vec<SaleLineView>) -> Self {
        SaleView {
            id: sale.id,
            sale_id: sale.sale_id,
            user_id: sale.user_id,
            total_amount: sale.total_amount,
            payment_method: sale.payment_method,
            status: sale.status,
            sales_date: sale.sales_date,
            items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub sale: SaleView,
}

#[derive(Debug, Serialize)]
pub struct SaleSummary {
    #[serde(flatten)]
    pub sale: Sale,
    pub item_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SalesPage {
    pub sales: Vec<SaleSummary>,
    pub products: Vec<Product>,
    pub categories: Vec<String>,
}

// =============================================================================
// Compensation Log
// =============================================================================

/// One step that reverses an already-applied write.
#[derive(Debug)]
enum Undo {
    Stock { product: Product, delta: i64 },
    DeleteItem(i64),
    DeleteSale(i64),
    ReinsertItem(NewSaleItem),
}

impl Undo {
    async fn apply(&self, backend: &Backend) -> StoreResult<()> {
        match self {
            Undo::Stock { product, delta } => {
                backend.products().adjust_stock(product, *delta).await?;
            }
            Undo::DeleteItem(id) => backend.sales().delete_item(*id).await?,
            Undo::DeleteSale(id) => backend.sales().delete(*id).await?,
            Undo::ReinsertItem(item) => {
                backend.sales().insert_item(item).await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CompensationLog {
    steps: Vec<Undo>,
}

impl CompensationLog {
    fn record(&mut self, step: Undo) {
        self.steps.push(step);
    }

    /// Replays the recorded steps newest first. Failures are logged and
    /// the remaining steps still run.
    async fn unwind(self, backend: &Backend, operation: &str) {
        let total = self.steps.len();
        for step in self.steps.into_iter().rev() {
            if let Err(err) = step.apply(backend).await {
                error!(operation, ?step, error = %err, "Compensation step failed");
            }
        }
        warn!(operation, steps = total, "Rolled back partial sale write");
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct SalesService {
    state: AppState,
}

impl SalesService {
    pub fn new(state: AppState) -> Self {
        SalesService { state }
    }

    pub async fn list(&self) -> ApiResult<SalesPage> {
        let sales_repo = self.state.backend.sales();
        let products_repo = self.state.backend.products();

        let sales = sales_repo.list_recent(RECENT_SALES_LIMIT).await?;
        let ids: Vec<i64> = sales.iter().map(|s| s.id).collect();
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for item in sales_repo.items_for_sales(&ids).await? {
            *counts.entry(item.sale_id).or_default() += 1;
        }

        let products = products_repo.list_in_stock().await?;
        let mut categories: Vec<String> = products.iter().map(|p| p.category.clone()).collect();
        categories.sort();
        categories.dedup();

        Ok(SalesPage {
            sales: sales
                .into_iter()
                .map(|sale| SaleSummary {
                    item_count: counts.get(&sale.id).copied().unwrap_or(0),
                    sale,
                })
                .collect(),
            products,
            categories,
        })
    }

    /// `id` is tried as the numeric row id first, then as the sale ID.
    pub async fn get(&self, query: SaleQuery) -> ApiResult<SaleResponse> {
        let raw = query.id.as_deref().map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return Err(ApiError::validation("Sale ID is required"));
        }

        let repo = self.state.backend.sales();
        let mut sale = match raw.parse::<i64>() {
            Ok(id) => repo.get(id).await?,
            Err(_) => None,
        };
        if sale.is_none() {
            sale = repo.get_by_sale_id(raw).await?;
        }
        let sale = sale.ok_or_else(|| ApiError::not_found("Sale not found"))?;

        let items = repo.items_for(sale.id).await?;
        let lines = self.describe_items(&items).await?;

        Ok(SaleResponse {
            success: true,
            message: None,
            sale: SaleView::new(sale, lines),
        })
    }

    async fn describe_items(&self, items: &[SaleItem]) -> ApiResult<Vec<SaleLineView>> {
        let ids: Vec<i64> = items.iter().filter_map(|i| i.product_id).collect();
        let names: HashMap<i64, String> = self
            .state
            .backend
            .products()
            .get_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        Ok(items
            .iter()
            .map(|item| SaleLineView {
                product_name: item
                    .product_id
                    .and_then(|id| names.get(&id).cloned())
                    .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
                quantity: item.quantity,
                subtotal: item.subtotal,
                unit_price: Some(item.unit_price),
            })
            .collect())
    }

    pub async fn create(&self, ctx: &RequestContext, req: CreateSaleRequest) -> ApiResult<SaleResponse> {
        let payment_method: PaymentMethod = req.payment_method.as_deref().unwrap_or("").parse()?;
        if !req.total_amount.is_positive() {
            return Err(ValidationError::must_be_positive("total_amount").into());
        }
        if req.items.is_empty() {
            return Err(ValidationError::required("items").into());
        }
        for line in &req.items {
            validate_quantity("quantity", line.quantity)?;
        }

        let products = self.resolve_products(&req.items).await?;

        let mut log = CompensationLog::default();
        match self
            .apply_create(ctx, &req, payment_method, products, &mut log)
            .await
        {
            Ok(response) => Ok(response),
            Err(err) => {
                log.unwind(&self.state.backend, "create_sale").await;
                Err(err)
            }
        }
    }

    /// Looks up every product before anything is written and checks the
    /// requested quantities, summed per product, against stock on hand.
    async fn resolve_products(&self, lines: &[SaleLineRequest]) -> ApiResult<HashMap<String, Product>> {
        let repo = self.state.backend.products();
        let mut products: HashMap<String, Product> = HashMap::new();
        let mut requested: HashMap<&str, i64> = HashMap::new();

        for line in lines {
            let key = line.product_id.trim();
            if !products.contains_key(key) {
                let product = repo.get_by_product_id(key).await?.ok_or_else(|| {
                    ApiError::not_found(format!("Product {} not found", key))
                })?;
                products.insert(key.to_string(), product);
            }
            *requested.entry(key).or_default() += line.quantity;
        }

        for (key, quantity) in requested {
            if let Some(product) = products.get(key) {
                if quantity > product.current_stock {
                    return Err(CoreError::InsufficientStock {
                        product_id: product.product_id.clone(),
                        available: product.current_stock,
                        requested: quantity,
                    }
                    .into());
                }
            }
        }
        Ok(products)
    }

    async fn apply_create(
        &self,
        ctx: &RequestContext,
        req: &CreateSaleRequest,
        payment_method: PaymentMethod,
        mut products: HashMap<String, Product>,
        log: &mut CompensationLog,
    ) -> ApiResult<SaleResponse> {
        let sales = self.state.backend.sales();
        let sale = sales
            .create(&NewSale {
                user_id: ctx.user_tag(),
                sales_date: Utc::now(),
                total_amount: req.total_amount,
                payment_method,
                status: SaleStatus::Completed,
            })
            .await?;
        log.record(Undo::DeleteSale(sale.id));

        let mut lines = Vec::with_capacity(req.items.len());
        for line in &req.items {
            let key = line.product_id.trim();
            let product = products
                .get(key)
                .cloned()
                .ok_or_else(|| ApiError::not_found(format!("Product {} not found", key)))?;

            let unit_price = line.unit_price.unwrap_or(product.price);
            let subtotal = line
                .subtotal
                .unwrap_or_else(|| unit_price.multiply_quantity(line.quantity));

            let item = sales
                .insert_item(&NewSaleItem {
                    sale_id: sale.id,
                    product_id: Some(product.id),
                    quantity: line.quantity,
                    unit_price,
                    subtotal,
                })
                .await?;
            log.record(Undo::DeleteItem(item.id));

            let adjustment = self
                .state
                .backend
                .products()
                .adjust_stock(&product, -line.quantity)
                .await?;
            log.record(Undo::Stock {
                product: adjustment.product.clone(),
                delta: line.quantity,
            });

            lines.push(SaleLineView {
                product_name: product.name.clone(),
                quantity: line.quantity,
                subtotal,
                unit_price: None,
            });
            products.insert(key.to_string(), adjustment.product);
        }

        info!(
            sale_id = %sale.sale_id,
            total = %sale.total_amount,
            items = lines.len(),
            user = %ctx.user.email,
            "Sale created"
        );

        Ok(SaleResponse {
            success: true,
            message: Some("Sale created successfully".to_string()),
            sale: SaleView::new(sale, lines),
        })
    }

    pub async fn delete(&self, req: SaleIdRequest) -> ApiResult<MessageResponse> {
        let id = req.id.ok_or_else(|| ApiError::validation("Sale ID is required"))?;
        let sales = self.state.backend.sales();
        let sale = sales
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Sale not found"))?;
        let items = sales.items_for(sale.id).await?;

        let mut log = CompensationLog::default();
        match self.apply_delete(&sale, &items, &mut log).await {
            Ok(()) => {
                info!(sale_id = %sale.sale_id, items = items.len(), "Sale deleted");
                Ok(MessageResponse::ok(format!(
                    "Sale {} deleted successfully",
                    sale.sale_id
                )))
            }
            Err(err) => {
                log.unwind(&self.state.backend, "delete_sale").await;
                Err(err)
            }
        }
    }

    async fn apply_delete(
        &self,
        sale: &Sale,
        items: &[SaleItem],
        log: &mut CompensationLog,
    ) -> ApiResult<()> {
        let products_repo = self.state.backend.products();
        let ids: Vec<i64> = items.iter().filter_map(|i| i.product_id).collect();
        let mut products: HashMap<i64, Product> = products_repo
            .get_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for item in items {
            let Some(product) = item.product_id.and_then(|id| products.get(&id).cloned()) else {
                warn!(sale_id = %sale.sale_id, item = item.id, "Sold product no longer exists, stock not restored");
                continue;
            };
            let adjustment = products_repo.adjust_stock(&product, item.quantity).await?;
            log.record(Undo::Stock {
                product: adjustment.product.clone(),
                delta: -item.quantity,
            });
            products.insert(product.id, adjustment.product);
        }

        let sales = self.state.backend.sales();
        sales.delete_items(sale.id).await?;
        for item in items {
            log.record(Undo::ReinsertItem(NewSaleItem::from(item)));
        }

        sales.delete(sale.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::testing::{context, memory_state, product};
    use retail_core::types::StockStatus;
    use retail_mail::RecordingMailer;
    use retail_store::memory::Op;
    use retail_store::Table;

    fn line(product_id: &str, quantity: i64, unit_cents: i64) -> SaleLineRequest {
        SaleLineRequest {
            product_id: product_id.to_string(),
            quantity,
            unit_price: Some(Money::from_cents(unit_cents)),
            subtotal: Some(Money::from_cents(unit_cents * quantity)),
        }
    }

    fn request(items: Vec<SaleLineRequest>) -> CreateSaleRequest {
        let total = items
            .iter()
            .filter_map(|l| l.subtotal)
            .sum::<Money>();
        CreateSaleRequest {
            payment_method: Some("CASH".into()),
            total_amount: total,
            items,
        }
    }

    async fn stock_of(memory: &crate::state::MemoryState, product_id: &str) -> Product {
        memory
            .state
            .backend
            .products()
            .get_by_product_id(product_id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_delete_restores_stock() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 5).await;
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        let created = service
            .create(&ctx, request(vec![line(&tea.product_id, 3, 350)]))
            .await
            .unwrap();
        assert_eq!(created.sale.sale_id, "0001");
        assert_eq!(created.sale.user_id.as_deref(), Some("#a1b"));
        assert_eq!(created.sale.items[0].product_name, "Green Tea");

        let after_sale = stock_of(&memory, &tea.product_id).await;
        assert_eq!(after_sale.current_stock, 2);
        assert_eq!(after_sale.status, StockStatus::LowStock);

        let deleted = service
            .delete(SaleIdRequest {
                id: Some(created.sale.id),
            })
            .await
            .unwrap();
        assert_eq!(deleted.message, "Sale 0001 deleted successfully");

        let restored = stock_of(&memory, &tea.product_id).await;
        assert_eq!(restored.current_stock, 5);
        assert_eq!(restored.status, StockStatus::LowStock);
        assert!(memory.tables.rows(Table::SalesItems).await.is_empty());
        assert!(memory.tables.rows(Table::Sales).await.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_before_writing() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 5).await;
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        let err = service
            .create(&ctx, request(vec![line(&tea.product_id, 6, 350)]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);

        // Two lines of the same product count together.
        let err = service
            .create(
                &ctx,
                request(vec![line(&tea.product_id, 3, 350), line(&tea.product_id, 3, 350)]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);

        let err = service
            .create(&ctx, request(vec![line("#1999", 1, 350)]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        assert!(memory.tables.rows(Table::Sales).await.is_empty());
        assert_eq!(stock_of(&memory, &tea.product_id).await.current_stock, 5);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let memory = memory_state(&RecordingMailer::new());
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        let mut req = request(vec![line("#1000", 1, 350)]);
        req.payment_method = None;
        let err = service.create(&ctx, req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);

        let mut req = request(vec![line("#1000", 1, 350)]);
        req.total_amount = Money::zero();
        assert_eq!(service.create(&ctx, req).await.unwrap_err().code, ErrorCode::Validation);

        let req = CreateSaleRequest {
            payment_method: Some("CARD".into()),
            total_amount: Money::from_cents(100),
            items: vec![],
        };
        assert_eq!(service.create(&ctx, req).await.unwrap_err().code, ErrorCode::Validation);

        let req = request(vec![line("#1000", 0, 350)]);
        assert_eq!(service.create(&ctx, req).await.unwrap_err().code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn test_create_failure_is_compensated() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 20).await;
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        memory.tables.fail_next(Op::Update, Table::Products).await;
        let err = service
            .create(&ctx, request(vec![line(&tea.product_id, 2, 350)]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Upstream);

        assert!(memory.tables.rows(Table::Sales).await.is_empty());
        assert!(memory.tables.rows(Table::SalesItems).await.is_empty());
        assert_eq!(stock_of(&memory, &tea.product_id).await.current_stock, 20);
    }

    #[tokio::test]
    async fn test_failed_item_insert_removes_sale() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 20).await;
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        memory.tables.fail_next(Op::Insert, Table::SalesItems).await;
        service
            .create(&ctx, request(vec![line(&tea.product_id, 2, 350)]))
            .await
            .unwrap_err();

        assert!(memory.tables.rows(Table::Sales).await.is_empty());
        assert_eq!(stock_of(&memory, &tea.product_id).await.current_stock, 20);
    }

    #[tokio::test]
    async fn test_delete_failure_is_compensated() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 20).await;
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        let created = service
            .create(&ctx, request(vec![line(&tea.product_id, 4, 350)]))
            .await
            .unwrap();

        memory.tables.fail_next(Op::Delete, Table::Sales).await;
        service
            .delete(SaleIdRequest {
                id: Some(created.sale.id),
            })
            .await
            .unwrap_err();

        assert_eq!(memory.tables.rows(Table::Sales).await.len(), 1);
        assert_eq!(memory.tables.rows(Table::SalesItems).await.len(), 1);
        assert_eq!(stock_of(&memory, &tea.product_id).await.current_stock, 16);
    }

    #[tokio::test]
    async fn test_get_by_row_id_or_sale_id() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 20).await;
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        let created = service
            .create(&ctx, request(vec![line(&tea.product_id, 2, 350)]))
            .await
            .unwrap();

        let by_row = service
            .get(SaleQuery {
                id: Some(created.sale.id.to_string()),
            })
            .await
            .unwrap();
        assert_eq!(by_row.sale.sale_id, "0001");
        assert_eq!(by_row.sale.items[0].unit_price, Some(Money::from_cents(350)));

        let by_sale_id = service
            .get(SaleQuery {
                id: Some("0001".into()),
            })
            .await
            .unwrap();
        assert_eq!(by_sale_id.sale.id, created.sale.id);

        // A deleted product shows up as unknown.
        memory
            .state
            .backend
            .products()
            .delete(&tea.product_id)
            .await
            .unwrap();
        let orphan = service
            .get(SaleQuery {
                id: Some("0001".into()),
            })
            .await
            .unwrap();
        assert_eq!(orphan.sale.items[0].product_name, "Unknown Product");

        let err = service
            .get(SaleQuery {
                id: Some("9999".into()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_list_counts_items() {
        let memory = memory_state(&RecordingMailer::new());
        let tea = product(&memory, "Green Tea", "Beverages", 350, 20).await;
        let pen = product(&memory, "Ballpoint Pen", "Stationery", 120, 30).await;
        product(&memory, "Glue Stick", "Stationery", 200, 0).await;
        let service = SalesService::new(memory.state.clone());
        let ctx = context("cashier@shop.example.com");

        service
            .create(
                &ctx,
                request(vec![line(&tea.product_id, 1, 350), line(&pen.product_id, 2, 120)]),
            )
            .await
            .unwrap();

        let page = service.list().await.unwrap();
        assert_eq!(page.sales.len(), 1);
        assert_eq!(page.sales[0].item_count, 2);
        assert_eq!(page.products.len(), 2);
        assert_eq!(page.categories, vec!["Beverages", "Stationery"]);
    }
}
