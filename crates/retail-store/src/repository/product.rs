//! # Product Repository
//!
//! Product rows and stock movements.
//!
//! ## Conditional Stock Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read product (stock = 12)                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE products SET current_stock = 9, status = 'low_stock'            │
//! │   WHERE id = 7 AND current_stock = 12                                   │
//! │       │                                                                 │
//! │       ├── 1 row  → done                                                 │
//! │       └── 0 rows → someone else moved the stock: re-read and retry      │
//! │                    (at most STOCK_UPDATE_ATTEMPTS times)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use retail_core::ids::{IdScheme, KNOWN_CATEGORIES};
use retail_core::stock::{apply_delta, derive_status, StockLevels};
use retail_core::types::{NewProduct, Product};

use crate::client::{first, from_row, from_rows, select_in, to_row, TableClient};
use crate::error::{StoreError, StoreResult};
use crate::query::{contains_pattern, Filter, Row, Select, Table};
use crate::sequence::insert_with_sequential_id;

/// Compare-and-set attempts for one stock movement.
pub const STOCK_UPDATE_ATTEMPTS: usize = 3;

/// Result of a stock movement.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub before: i64,
    pub after: i64,
    pub product: Product,
}

#[derive(Debug, Clone)]
pub struct ProductRepository {
    client: Arc<dyn TableClient>,
}

impl ProductRepository {
    pub fn new(client: Arc<dyn TableClient>) -> Self {
        ProductRepository { client }
    }

    /// Products ordered by business ID. `search` is a case-insensitive
    /// substring match on name or product ID.
    pub async fn list(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> StoreResult<Vec<Product>> {
        let mut query = Select::from(Table::Products).order_by("product_id", false);
        if let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) {
            query = query.eq("category", category);
        }
        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(term);
            query = query.or(vec![
                Filter::ilike("name", pattern.clone()),
                Filter::ilike("product_id", pattern),
            ]);
        }
        from_rows(self.client.select(&query).await?)
    }

    /// Products with stock on hand, for the point-of-sale picker.
    pub async fn list_in_stock(&self) -> StoreResult<Vec<Product>> {
        let query = Select::from(Table::Products)
            .filter(Filter::Gt("current_stock".into(), Value::from(0)))
            .order_by("category", false)
            .order_by("name", false);
        from_rows(self.client.select(&query).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        let query = Select::from(Table::Products).eq("id", id).limit(1);
        first(self.client.select(&query).await?)
    }

    pub async fn get_by_product_id(&self, product_id: &str) -> StoreResult<Option<Product>> {
        let query = Select::from(Table::Products)
            .eq("product_id", product_id)
            .limit(1);
        first(self.client.select(&query).await?)
    }

    /// Products by surrogate id. Missing ids are skipped.
    pub async fn get_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Product>> {
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        let ids: Vec<Value> = unique.into_iter().map(Value::from).collect();
        let rows = select_in(self.client.as_ref(), &Select::from(Table::Products), "id", &ids).await?;
        from_rows(rows)
    }

    /// Distinct categories: the known ones first in their fixed order, then
    /// any others alphabetically.
    pub async fn categories(&self) -> StoreResult<Vec<String>> {
        let query = Select::from(Table::Products).columns(&["category"]);
        let present: HashSet<String> = self
            .client
            .select(&query)
            .await?
            .into_iter()
            .filter_map(|mut r| match r.remove("category") {
                Some(Value::String(s)) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect();

        Ok(order_categories(present))
    }

    /// Inserts with the next free category-prefixed ID.
    pub async fn create(&self, new: &NewProduct) -> StoreResult<Product> {
        let scheme = IdScheme::product(&new.category);
        let row = insert_with_sequential_id(
            self.client.as_ref(),
            Table::Products,
            "product_id",
            &scheme,
            to_row(new)?,
        )
        .await?;

        let product: Product = from_row(row)?;
        info!(product_id = %product.product_id, category = %product.category, "Product created");
        Ok(product)
    }

    /// Writes `changes` to the product with this business ID.
    pub async fn update_fields(&self, product_id: &str, changes: Row) -> StoreResult<Product> {
        let rows = self
            .client
            .update(
                Table::Products,
                &[Filter::eq("product_id", product_id)],
                changes,
            )
            .await?;
        first(rows)?.ok_or_else(|| StoreError::not_found("Product", product_id))
    }

    /// Moves stock by `delta` (floored at zero) and recomputes the status.
    ///
    /// `product` is the caller's last read; if the stored stock has moved
    /// since, the row is re-read and the move retried.
    pub async fn adjust_stock(&self, product: &Product, delta: i64) -> StoreResult<StockAdjustment> {
        let mut current = product.clone();

        for attempt in 1..=STOCK_UPDATE_ATTEMPTS {
            let before = current.current_stock;
            let after = apply_delta(before, delta);
            let status = derive_status(&StockLevels::new(
                after,
                current.max_stock,
                current.low_stock_threshold,
            ));

            let mut changes = Row::new();
            changes.insert("current_stock".into(), Value::from(after));
            changes.insert("status".into(), Value::String(status.as_str().to_string()));

            let filters = [
                Filter::eq("id", current.id),
                Filter::eq("current_stock", before),
            ];
            let rows = self.client.update(Table::Products, &filters, changes).await?;

            if let Some(updated) = first::<Product>(rows)? {
                debug!(
                    product_id = %updated.product_id,
                    before,
                    after,
                    status = status.as_str(),
                    "Stock adjusted"
                );
                return Ok(StockAdjustment {
                    before,
                    after,
                    product: updated,
                });
            }

            warn!(product_id = %current.product_id, attempt, "Stock changed underneath, retrying");
            current = self
                .get_by_id(current.id)
                .await?
                .ok_or_else(|| StoreError::not_found("Product", &current.product_id))?;
        }

        Err(StoreError::Conflict(format!(
            "stock for {} kept changing",
            product.product_id
        )))
    }

    pub async fn delete(&self, product_id: &str) -> StoreResult<()> {
        let deleted = self
            .client
            .delete(Table::Products, &[Filter::eq("product_id", product_id)])
            .await?;
        if deleted == 0 {
            return Err(StoreError::not_found("Product", product_id));
        }
        info!(product_id, "Product deleted");
        Ok(())
    }
}

fn order_categories(present: HashSet<String>) -> Vec<String> {
    let mut ordered: Vec<String> = KNOWN_CATEGORIES
        .iter()
        .map(|(name, _)| name.to_string())
        .filter(|name| present.contains(name))
        .collect();

    let mut others: Vec<String> = present
        .into_iter()
        .filter(|c| !KNOWN_CATEGORIES.iter().any(|(name, _)| name == c))
        .collect();
    others.sort();
    ordered.extend(others);
    ordered
}
