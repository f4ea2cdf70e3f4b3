//! # In-Memory Backend
//!
//! A [`TableClient`] that keeps the four tables in process memory. It
//! enforces the same constraints as the Postgres schema so the services
//! behave identically against it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Constraint                              Behaviour                      │
//! │  ──────────────────────────────────────  ─────────────────────────────  │
//! │  employees.employee_id, employees.email  unique (NULL ignored)          │
//! │  products.product_id, sales.sale_id      unique                         │
//! │  sales_items.sale_id → sales.id          must exist; RESTRICT delete    │
//! │  sales_items.product_id → products.id    must exist; SET NULL on delete │
//! │  id                                      assigned from a counter        │
//! │  created_at / updated_at                 filled in on write             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tests can make the next operation on a table fail with
//! [`MemoryTableClient::fail_next`] to exercise compensation paths.

use async_trait::async_trait;
use chrono::Utc;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use retail_core::types::timestamp;

use crate::client::{require_filters, TableClient};
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Row, Select, Table};

/// Operation kinds for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<Table, Vec<Row>>,
    next_id: HashMap<Table, i64>,
    failures: Vec<(Op, Table)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTableClient {
    state: Arc<Mutex<MemoryState>>,
}

const UNIQUE_COLUMNS: &[(Table, &str)] = &[
    (Table::Employees, "employee_id"),
    (Table::Employees, "email"),
    (Table::Products, "product_id"),
    (Table::Sales, "sale_id"),
];

fn has_updated_at(table: Table) -> bool {
    matches!(table, Table::Employees | Table::Products)
}

fn has_created_at(table: Table) -> bool {
    !matches!(table, Table::SalesItems)
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `op` against `table` fail with a connection error.
    pub async fn fail_next(&self, op: Op, table: Table) {
        self.state.lock().await.failures.push((op, table));
    }

    /// Snapshot of a table.
    pub async fn rows(&self, table: Table) -> Vec<Row> {
        self.state
            .lock()
            .await
            .tables
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts rows through the normal constraint checks.
    pub async fn seed(&self, table: Table, rows: Vec<Row>) -> StoreResult<Vec<Row>> {
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(self.insert(table, row).await?);
        }
        Ok(stored)
    }
}

impl MemoryState {
    fn take_failure(&mut self, op: Op, table: Table) -> StoreResult<()> {
        if let Some(pos) = self.failures.iter().position(|f| *f == (op, table)) {
            self.failures.remove(pos);
            return Err(StoreError::ConnectionFailed(format!(
                "injected {:?} failure on {}",
                op, table
            )));
        }
        Ok(())
    }

    fn table(&self, table: Table) -> &[Row] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn id_exists(&self, table: Table, id: &Value) -> bool {
        self.table(table)
            .iter()
            .any(|r| r.get("id").map(|v| values_equal(v, id)).unwrap_or(false))
    }

    /// Unique and foreign-key checks for `row` as it would be stored.
    fn check_constraints(&self, table: Table, row: &Row, skip_id: Option<&Value>) -> StoreResult<()> {
        for (t, column) in UNIQUE_COLUMNS.iter().filter(|(t, _)| *t == table) {
            let Some(value) = row.get(*column).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self.table(*t).iter().any(|other| {
                let same_row = match (skip_id, other.get("id")) {
                    (Some(a), Some(b)) => values_equal(a, b),
                    _ => false,
                };
                !same_row
                    && other
                        .get(*column)
                        .map(|v| values_equal(v, value))
                        .unwrap_or(false)
            });
            if clash {
                return Err(StoreError::duplicate(*column, display_value(value)));
            }
        }

        if table == Table::SalesItems {
            match row.get("sale_id") {
                Some(v) if !v.is_null() && self.id_exists(Table::Sales, v) => {}
                _ => {
                    return Err(StoreError::ForeignKeyViolation {
                        message: "sales_items.sale_id does not reference a sale".to_string(),
                    })
                }
            }
            if let Some(v) = row.get("product_id").filter(|v| !v.is_null()) {
                if !self.id_exists(Table::Products, v) {
                    return Err(StoreError::ForeignKeyViolation {
                        message: "sales_items.product_id does not reference a product"
                            .to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TableClient for MemoryTableClient {
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
        query.validate()?;
        let mut state = self.state.lock().await;
        state.take_failure(Op::Select, query.table)?;

        let mut rows: Vec<Row> = state
            .table(query.table)
            .iter()
            .filter(|r| query.filters.iter().all(|f| matches_filter(r, f)))
            .cloned()
            .collect();

        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                for o in &query.order {
                    let ord = compare_nulls_last(a.get(&o.column), b.get(&o.column));
                    let ord = if o.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }

        if let Some(columns) = &query.columns {
            for row in rows.iter_mut() {
                row.retain(|k, _| columns.iter().any(|c| c == k));
            }
        }

        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Row) -> StoreResult<Row> {
        crate::query::check_row(&row)?;
        let mut state = self.state.lock().await;
        state.take_failure(Op::Insert, table)?;

        let id = {
            let counter = state.next_id.entry(table).or_insert(0);
            *counter += 1;
            *counter
        };
        row.insert("id".to_string(), Value::from(id));

        let now = Value::String(Utc::now().to_rfc3339());
        if has_created_at(table) {
            row.entry("created_at").or_insert_with(|| now.clone());
        }
        if has_updated_at(table) {
            row.entry("updated_at").or_insert(now);
        }

        state.check_constraints(table, &row, None)?;
        state.tables.entry(table).or_default().push(row.clone());
        debug!(table = %table, id, "memory insert");
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        changes: Row,
    ) -> StoreResult<Vec<Row>> {
        require_filters("update", table, filters)?;
        crate::query::check_filters(filters)?;
        crate::query::check_row(&changes)?;
        let mut state = self.state.lock().await;
        state.take_failure(Op::Update, table)?;

        let now = Value::String(Utc::now().to_rfc3339());
        let mut staged: Vec<(usize, Row)> = Vec::new();
        for (idx, row) in state.table(table).iter().enumerate() {
            if filters.iter().all(|f| matches_filter(row, f)) {
                let mut next = row.clone();
                for (k, v) in &changes {
                    next.insert(k.clone(), v.clone());
                }
                if has_updated_at(table) && !changes.contains_key("updated_at") {
                    next.insert("updated_at".to_string(), now.clone());
                }
                staged.push((idx, next));
            }
        }

        for (_, next) in &staged {
            let id = next.get("id").cloned().unwrap_or(Value::Null);
            state.check_constraints(table, next, Some(&id))?;
        }

        let rows = state.tables.entry(table).or_default();
        let mut updated = Vec::with_capacity(staged.len());
        for (idx, next) in staged {
            rows[idx] = next.clone();
            updated.push(next);
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<u64> {
        require_filters("delete", table, filters)?;
        crate::query::check_filters(filters)?;
        let mut state = self.state.lock().await;
        state.take_failure(Op::Delete, table)?;

        let doomed: Vec<Value> = state
            .table(table)
            .iter()
            .filter(|r| filters.iter().all(|f| matches_filter(r, f)))
            .filter_map(|r| r.get("id").cloned())
            .collect();

        match table {
            Table::Sales => {
                let referenced = state.table(Table::SalesItems).iter().any(|item| {
                    item.get("sale_id")
                        .map(|s| doomed.iter().any(|d| values_equal(s, d)))
                        .unwrap_or(false)
                });
                if referenced {
                    return Err(StoreError::ForeignKeyViolation {
                        message: "sale still has line items".to_string(),
                    });
                }
            }
            Table::Products => {
                if let Some(items) = state.tables.get_mut(&Table::SalesItems) {
                    for item in items.iter_mut() {
                        let hit = item
                            .get("product_id")
                            .map(|p| doomed.iter().any(|d| values_equal(p, d)))
                            .unwrap_or(false);
                        if hit {
                            item.insert("product_id".to_string(), Value::Null);
                        }
                    }
                }
            }
            _ => {}
        }

        let rows = state.tables.entry(table).or_default();
        let before = rows.len();
        rows.retain(|r| {
            !r.get("id")
                .map(|id| doomed.iter().any(|d| values_equal(id, d)))
                .unwrap_or(false)
        });
        Ok((before - rows.len()) as u64)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// Filter Evaluation
// =============================================================================

fn matches_filter(row: &Row, filter: &Filter) -> bool {
    let get = |c: &str| row.get(c).filter(|v| !v.is_null());
    match filter {
        Filter::Eq(c, v) => get(c).map(|x| values_equal(x, v)).unwrap_or(false),
        Filter::Neq(c, v) => get(c).map(|x| !values_equal(x, v)).unwrap_or(false),
        Filter::Gt(c, v) => cmp_is(get(c), v, |o| o == Ordering::Greater),
        Filter::Gte(c, v) => cmp_is(get(c), v, |o| o != Ordering::Less),
        Filter::Lt(c, v) => cmp_is(get(c), v, |o| o == Ordering::Less),
        Filter::Lte(c, v) => cmp_is(get(c), v, |o| o != Ordering::Greater),
        Filter::Like(c, p) => get(c).map(|x| like(x, p, false)).unwrap_or(false),
        Filter::ILike(c, p) => get(c).map(|x| like(x, p, true)).unwrap_or(false),
        Filter::In(c, vs) => get(c)
            .map(|x| vs.iter().any(|v| values_equal(x, v)))
            .unwrap_or(false),
        Filter::IsNull(c) => get(c).is_none(),
        Filter::Or(inner) => inner.iter().any(|f| matches_filter(row, f)),
    }
}

fn cmp_is(left: Option<&Value>, right: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    left.and_then(|l| compare_values(l, right))
        .map(pred)
        .unwrap_or(false)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numbers compare numerically, timestamps chronologically, everything
/// else by text.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            as_number(a)?.partial_cmp(&as_number(b)?)
        }
        (Value::String(x), Value::String(y)) => {
            match (timestamp::parse(x), timestamp::parse(y)) {
                (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
                _ => Some(x.cmp(y)),
            }
        }
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

fn compare_nulls_last(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL LIKE: `%` any run, `_` one char, `\` escapes.
fn like(value: &Value, pattern: &str, case_insensitive: bool) -> bool {
    let mut re = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');

    RegexBuilder::new(&re)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map(|r| r.is_match(&display_value(value)))
        .unwrap_or(false)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_timestamps() {
        let client = MemoryTableClient::new();
        let a = client
            .insert(Table::Products, row(json!({"product_id": "#1000", "name": "Tea"})))
            .await
            .unwrap();
        let b = client
            .insert(Table::Products, row(json!({"product_id": "#1001", "name": "Coffee"})))
            .await
            .unwrap();

        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        assert!(a.contains_key("created_at"));
        assert!(a.contains_key("updated_at"));
    }

    #[tokio::test]
    async fn test_unique_columns_are_enforced() {
        let client = MemoryTableClient::new();
        client
            .insert(Table::Sales, row(json!({"sale_id": "0001"})))
            .await
            .unwrap();
        let err = client
            .insert(Table::Sales, row(json!({"sale_id": "0001"})))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("sale_id"));

        // NULL emails never clash
        client
            .insert(Table::Employees, row(json!({"employee_id": "S0001", "email": null})))
            .await
            .unwrap();
        client
            .insert(Table::Employees, row(json!({"employee_id": "S0002", "email": null})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sale_items_reference_sales() {
        let client = MemoryTableClient::new();
        let err = client
            .insert(Table::SalesItems, row(json!({"sale_id": 99, "quantity": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));

        let sale = client
            .insert(Table::Sales, row(json!({"sale_id": "0001"})))
            .await
            .unwrap();
        client
            .insert(Table::SalesItems, row(json!({"sale_id": sale["id"], "quantity": 1})))
            .await
            .unwrap();

        // Restricted while items remain
        let err = client
            .delete(Table::Sales, &[Filter::eq("id", sale["id"].clone())])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));

        client
            .delete(Table::SalesItems, &[Filter::eq("sale_id", sale["id"].clone())])
            .await
            .unwrap();
        let gone = client
            .delete(Table::Sales, &[Filter::eq("id", sale["id"].clone())])
            .await
            .unwrap();
        assert_eq!(gone, 1);
    }

    #[tokio::test]
    async fn test_product_delete_nulls_item_reference() {
        let client = MemoryTableClient::new();
        let product = client
            .insert(Table::Products, row(json!({"product_id": "#1000", "name": "Tea"})))
            .await
            .unwrap();
        let sale = client
            .insert(Table::Sales, row(json!({"sale_id": "0001"})))
            .await
            .unwrap();
        client
            .insert(
                Table::SalesItems,
                row(json!({"sale_id": sale["id"], "product_id": product["id"], "quantity": 2})),
            )
            .await
            .unwrap();

        client
            .delete(Table::Products, &[Filter::eq("id", product["id"].clone())])
            .await
            .unwrap();

        let items = client.rows(Table::SalesItems).await;
        assert_eq!(items[0]["product_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_conditional_update_only_hits_matching_rows() {
        let client = MemoryTableClient::new();
        client
            .insert(Table::Products, row(json!({"product_id": "#1000", "current_stock": 5})))
            .await
            .unwrap();

        let miss = client
            .update(
                Table::Products,
                &[Filter::eq("id", 1), Filter::eq("current_stock", 4)],
                row(json!({"current_stock": 9})),
            )
            .await
            .unwrap();
        assert!(miss.is_empty());

        let hit = client
            .update(
                Table::Products,
                &[Filter::eq("id", 1), Filter::eq("current_stock", 5)],
                row(json!({"current_stock": 9})),
            )
            .await
            .unwrap();
        assert_eq!(hit[0]["current_stock"], json!(9));
    }

    #[tokio::test]
    async fn test_unfiltered_writes_are_refused() {
        let client = MemoryTableClient::new();
        assert!(client.delete(Table::Products, &[]).await.is_err());
        assert!(client.update(Table::Products, &[], Row::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_select_filters_order_and_limit() {
        let client = MemoryTableClient::new();
        for (name, date) in [
            ("a", "2025-03-01T10:00:00+00:00"),
            ("b", "2025-03-02T10:00:00+00:00"),
            ("c", "2025-03-03T10:00:00.000000"),
        ] {
            client
                .insert(Table::Sales, row(json!({"sale_id": name, "sales_date": date})))
                .await
                .unwrap();
        }

        let q = Select::from(Table::Sales)
            .gte("sales_date", "2025-03-02T00:00:00+00:00")
            .order_by("sales_date", true)
            .limit(1);
        let rows = client.select(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["sale_id"], json!("c"));

        let q = Select::from(Table::Sales).like("sale_id", "b%");
        assert_eq!(client.select(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ilike_and_or() {
        let client = MemoryTableClient::new();
        client
            .insert(
                Table::Employees,
                row(json!({"employee_id": "S0001", "name": "Aina Rahman", "email": "aina@x.my"})),
            )
            .await
            .unwrap();

        let q = Select::from(Table::Employees).or(vec![
            Filter::ilike("name", "%RAHMAN%"),
            Filter::ilike("email", "%nobody%"),
        ]);
        assert_eq!(client.select(&q).await.unwrap().len(), 1);

        let q = Select::from(Table::Employees).filter(Filter::ilike("name", "%50\\%%"));
        assert!(client.select(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let client = MemoryTableClient::new();
        client.fail_next(Op::Insert, Table::Sales).await;
        assert!(client
            .insert(Table::Sales, row(json!({"sale_id": "0001"})))
            .await
            .is_err());
        assert!(client
            .insert(Table::Sales, row(json!({"sale_id": "0001"})))
            .await
            .is_ok());
    }
}
