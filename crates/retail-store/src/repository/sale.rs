//! # Sale Repository
//!
//! Sales and their line items.
//!
//! Items reference the sale by surrogate `id`, so a sale cannot be deleted
//! while items remain: delete the items first.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use retail_core::ids::IdScheme;
use retail_core::types::{NewSale, NewSaleItem, Sale, SaleItem, SaleStatus};

use crate::client::{first, from_row, from_rows, select_in, to_row, TableClient};
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Select, Table};
use crate::sequence::insert_with_sequential_id;

#[derive(Debug, Clone)]
pub struct SaleRepository {
    client: Arc<dyn TableClient>,
}

impl SaleRepository {
    pub fn new(client: Arc<dyn TableClient>) -> Self {
        SaleRepository { client }
    }

    /// Latest sales first.
    pub async fn list_recent(&self, limit: u32) -> StoreResult<Vec<Sale>> {
        let query = Select::from(Table::Sales)
            .order_by("sales_date", true)
            .order_by("id", true)
            .limit(limit);
        from_rows(self.client.select(&query).await?)
    }

    pub async fn get(&self, id: i64) -> StoreResult<Option<Sale>> {
        let query = Select::from(Table::Sales).eq("id", id).limit(1);
        first(self.client.select(&query).await?)
    }

    pub async fn get_by_sale_id(&self, sale_id: &str) -> StoreResult<Option<Sale>> {
        let query = Select::from(Table::Sales).eq("sale_id", sale_id).limit(1);
        first(self.client.select(&query).await?)
    }

    /// Completed sales with `start <= sales_date < end`.
    pub async fn completed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Sale>> {
        let query = Select::from(Table::Sales)
            .eq("status", serde_json::to_value(SaleStatus::Completed)?)
            .gte("sales_date", start.to_rfc3339())
            .lt("sales_date", end.to_rfc3339())
            .order_by("sales_date", false);
        let sales: Vec<Sale> = from_rows(self.client.select(&query).await?)?;
        debug!(count = sales.len(), %start, %end, "Loaded completed sales");
        Ok(sales)
    }

    /// Inserts with the next free sequential sale ID.
    pub async fn create(&self, new: &NewSale) -> StoreResult<Sale> {
        let row = insert_with_sequential_id(
            self.client.as_ref(),
            Table::Sales,
            "sale_id",
            &IdScheme::sale(),
            to_row(new)?,
        )
        .await?;

        let sale: Sale = from_row(row)?;
        info!(sale_id = %sale.sale_id, total = %sale.total_amount, "Sale created");
        Ok(sale)
    }

    pub async fn insert_item(&self, item: &NewSaleItem) -> StoreResult<SaleItem> {
        let row = self.client.insert(Table::SalesItems, to_row(item)?).await?;
        from_row(row)
    }

    pub async fn items_for(&self, sale_id: i64) -> StoreResult<Vec<SaleItem>> {
        let query = Select::from(Table::SalesItems)
            .eq("sale_id", sale_id)
            .order_by("id", false);
        from_rows(self.client.select(&query).await?)
    }

    /// Items of several sales, batched by [`MAX_IN_LIST`](crate::client::MAX_IN_LIST) ids per request.
    pub async fn items_for_sales(&self, sale_ids: &[i64]) -> StoreResult<Vec<SaleItem>> {
        let ids: Vec<Value> = sale_ids.iter().copied().map(Value::from).collect();
        let rows = select_in(
            self.client.as_ref(),
            &Select::from(Table::SalesItems),
            "sale_id",
            &ids,
        )
        .await?;
        from_rows(rows)
    }

    pub async fn delete_item(&self, item_id: i64) -> StoreResult<()> {
        let deleted = self
            .client
            .delete(Table::SalesItems, &[Filter::eq("id", item_id)])
            .await?;
        if deleted == 0 {
            return Err(StoreError::not_found("Sale item", item_id));
        }
        Ok(())
    }

    /// Deletes every item of a sale; returns how many went.
    pub async fn delete_items(&self, sale_id: i64) -> StoreResult<u64> {
        self.client
            .delete(Table::SalesItems, &[Filter::eq("sale_id", sale_id)])
            .await
    }

    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let deleted = self
            .client
            .delete(Table::Sales, &[Filter::eq("id", id)])
            .await?;
        if deleted == 0 {
            return Err(StoreError::not_found("Sale", id));
        }
        info!(id, "Sale deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MAX_IN_LIST;
    use crate::memory::MemoryTableClient;
    use chrono::Duration;
    use retail_core::types::PaymentMethod;
    use retail_core::Money;

    fn new_sale(at: DateTime<Utc>, cents: i64) -> NewSale {
        NewSale {
            user_id: "#abc".to_string(),
            sales_date: at,
            total_amount: Money::from_cents(cents),
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_sale_ids_are_sequential() {
        let repo = SaleRepository::new(Arc::new(MemoryTableClient::new()));
        let a = repo.create(&new_sale(Utc::now(), 500)).await.unwrap();
        let b = repo.create(&new_sale(Utc::now(), 700)).await.unwrap();
        assert_eq!(a.sale_id, "0001");
        assert_eq!(b.sale_id, "0002");
        assert_eq!(b.total_amount, Money::from_cents(700));
    }

    #[tokio::test]
    async fn test_items_and_delete_order() {
        let repo = SaleRepository::new(Arc::new(MemoryTableClient::new()));
        let sale = repo.create(&new_sale(Utc::now(), 500)).await.unwrap();
        repo.insert_item(&NewSaleItem {
            sale_id: sale.id,
            product_id: None,
            quantity: 2,
            unit_price: Money::from_cents(250),
            subtotal: Money::from_cents(500),
        })
        .await
        .unwrap();

        assert_eq!(repo.items_for(sale.id).await.unwrap().len(), 1);
        assert_eq!(repo.items_for_sales(&[sale.id]).await.unwrap().len(), 1);

        assert!(matches!(
            repo.delete(sale.id).await.unwrap_err(),
            StoreError::ForeignKeyViolation { .. }
        ));
        assert_eq!(repo.delete_items(sale.id).await.unwrap(), 1);
        repo.delete(sale.id).await.unwrap();
        assert!(repo.get(sale.id).await.unwrap().is_none());
    }

    /// Delegates to memory tables and records the size of every `in` list.
    #[derive(Debug, Default)]
    struct InListRecorder {
        inner: MemoryTableClient,
        in_sizes: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl TableClient for InListRecorder {
        async fn select(&self, query: &Select) -> StoreResult<Vec<crate::query::Row>> {
            for filter in &query.filters {
                if let Filter::In(_, values) = filter {
                    self.in_sizes.lock().unwrap().push(values.len());
                }
            }
            self.inner.select(query).await
        }

        async fn insert(&self, table: Table, row: crate::query::Row) -> StoreResult<crate::query::Row> {
            self.inner.insert(table, row).await
        }

        async fn update(
            &self,
            table: Table,
            filters: &[Filter],
            changes: crate::query::Row,
        ) -> StoreResult<Vec<crate::query::Row>> {
            self.inner.update(table, filters, changes).await
        }

        async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<u64> {
            self.inner.delete(table, filters).await
        }

        async fn health_check(&self) -> StoreResult<()> {
            self.inner.health_check().await
        }

        fn backend_name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_items_for_many_sales_are_batched() {
        let client = Arc::new(InListRecorder::default());
        let repo = SaleRepository::new(client.clone());

        let mut ids = Vec::new();
        for cents in [100, 200, 300] {
            let sale = repo.create(&new_sale(Utc::now(), cents)).await.unwrap();
            repo.insert_item(&NewSaleItem {
                sale_id: sale.id,
                product_id: None,
                quantity: 1,
                unit_price: Money::from_cents(cents),
                subtotal: Money::from_cents(cents),
            })
            .await
            .unwrap();
            ids.push(sale.id);
        }
        // A busy window: hundreds of sales without loaded items.
        ids.extend(10_000..10_450);

        let items = repo.items_for_sales(&ids).await.unwrap();
        assert_eq!(items.len(), 3);

        let sizes = client.in_sizes.lock().unwrap().clone();
        assert_eq!(sizes, vec![MAX_IN_LIST, MAX_IN_LIST, ids.len() - 2 * MAX_IN_LIST]);
        assert!(repo.items_for_sales(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completed_between_is_half_open() {
        let repo = SaleRepository::new(Arc::new(MemoryTableClient::new()));
        let start = Utc::now() - Duration::hours(2);
        let end = start + Duration::hours(1);

        repo.create(&new_sale(start, 100)).await.unwrap();
        repo.create(&new_sale(start + Duration::minutes(30), 200)).await.unwrap();
        repo.create(&new_sale(end, 300)).await.unwrap();

        let mut cancelled = new_sale(start + Duration::minutes(10), 400);
        cancelled.status = SaleStatus::Cancelled;
        repo.create(&cancelled).await.unwrap();

        let found = repo.completed_between(start, end).await.unwrap();
        let cents: Vec<i64> = found.iter().map(|s| s.total_amount.cents()).collect();
        assert_eq!(cents, vec![100, 200]);
    }

    #[tokio::test]
    async fn test_recent_and_lookup_by_sale_id() {
        let repo = SaleRepository::new(Arc::new(MemoryTableClient::new()));
        let now = Utc::now();
        repo.create(&new_sale(now - Duration::days(1), 100)).await.unwrap();
        repo.create(&new_sale(now, 200)).await.unwrap();

        let recent = repo.list_recent(1).await.unwrap();
        assert_eq!(recent[0].sale_id, "0002");
        assert!(repo.get_by_sale_id("0001").await.unwrap().is_some());
        assert!(repo.get_by_sale_id("9999").await.unwrap().is_none());
    }
}
