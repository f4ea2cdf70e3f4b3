//! # Table Client
//!
//! The seam between repositories and the remote relational backend.
//!
//! ```text
//! ┌──────────────────┐      ┌────────────────────────────────────────────┐
//! │  Repositories    │      │  dyn TableClient                           │
//! │  employees()     │─────►│  ├── RestTableClient     (PostgREST)       │
//! │  products()      │      │  ├── PgTableClient       (sqlx / Postgres) │
//! │  sales()         │      │  └── MemoryTableClient   (tests, demo)     │
//! └──────────────────┘      └────────────────────────────────────────────┘
//! ```
//!
//! Every method maps to one request against the backend. There are no
//! multi-statement transactions: callers that need atomicity use
//! conditional updates (compare-and-set on a column value) instead.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Row, Select, Table};

#[async_trait]
pub trait TableClient: Send + Sync + std::fmt::Debug {
    /// Rows matching the query.
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>>;

    /// Inserts one row and returns it as stored (with `id` and defaults).
    async fn insert(&self, table: Table, row: Row) -> StoreResult<Row>;

    /// Applies `changes` to every row matching `filters` and returns the
    /// updated rows. An empty result means nothing matched.
    ///
    /// Implementations must refuse an empty filter list.
    async fn update(&self, table: Table, filters: &[Filter], changes: Row)
        -> StoreResult<Vec<Row>>;

    /// Deletes matching rows and returns how many went.
    ///
    /// Implementations must refuse an empty filter list.
    async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<u64>;

    /// Cheap round trip used by `/health`.
    async fn health_check(&self) -> StoreResult<()>;

    /// Short name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Rejects unfiltered writes.
pub(crate) fn require_filters(op: &str, table: Table, filters: &[Filter]) -> StoreResult<()> {
    if filters.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "refusing unfiltered {} on {}",
            op, table
        )));
    }
    Ok(())
}

/// Most values sent in one `in` filter. PostgREST carries the list in the
/// query string.
pub const MAX_IN_LIST: usize = 200;

/// Runs `base` with an `in` filter on `column`, one request per
/// [`MAX_IN_LIST`] values, and concatenates the rows.
pub async fn select_in(
    client: &dyn TableClient,
    base: &Select,
    column: &str,
    values: &[Value],
) -> StoreResult<Vec<Row>> {
    let mut rows = Vec::new();
    for chunk in values.chunks(MAX_IN_LIST) {
        let query = base.clone().in_list(column, chunk.to_vec());
        rows.extend(client.select(&query).await?);
    }
    Ok(rows)
}

// =============================================================================
// Row Conversion
// =============================================================================

/// Serializes an insert or update payload into a row.
pub fn to_row<T: Serialize>(value: &T) -> StoreResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(format!(
            "expected an object payload, got {}",
            other
        ))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> StoreResult<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

/// First row decoded, or `None`.
pub fn first<T: DeserializeOwned>(rows: Vec<Row>) -> StoreResult<Option<T>> {
    rows.into_iter().next().map(from_row).transpose()
}
