//! # Sequential Business IDs
//!
//! Employees, products and sales carry a human-readable ID next to the
//! surrogate key. The next free value is computed client-side from the IDs
//! already stored, so two concurrent creators can pick the same candidate.
//! The unique constraint on the column settles the race:
//!
//! ```text
//!   list IDs LIKE 'S%'  ──►  allocate lowest free  ──►  INSERT
//!          ▲                                             │
//!          │            unique violation on column       │
//!          └──────── add candidate to taken set ◄────────┘
//!                   (at most MAX_ALLOCATION_ATTEMPTS)
//! ```

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use retail_core::ids::IdScheme;

use crate::client::TableClient;
use crate::error::{StoreError, StoreResult};
use crate::query::{Row, Select, Table};

/// Insert attempts before giving up with [`StoreError::Conflict`].
pub const MAX_ALLOCATION_ATTEMPTS: usize = 5;

/// Every stored value of `column` that falls under `scheme`'s prefix.
pub async fn taken_ids(
    client: &dyn TableClient,
    table: Table,
    column: &str,
    scheme: &IdScheme,
) -> StoreResult<BTreeSet<String>> {
    let query = Select::from(table)
        .columns(&[column])
        .like(column, scheme.like_pattern());
    let rows = client.select(&query).await?;

    Ok(rows
        .into_iter()
        .filter_map(|mut r| match r.remove(column) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        })
        .collect())
}

/// Inserts `row` with the lowest free ID of `scheme` written to `column`.
///
/// Returns the stored row.
pub async fn insert_with_sequential_id(
    client: &dyn TableClient,
    table: Table,
    column: &str,
    scheme: &IdScheme,
    row: Row,
) -> StoreResult<Row> {
    let mut taken = taken_ids(client, table, column, scheme).await?;

    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let candidate = scheme.allocate(taken.iter().map(String::as_str))?;

        let mut payload = row.clone();
        payload.insert(column.to_string(), Value::String(candidate.clone()));

        match client.insert(table, payload).await {
            Ok(stored) => {
                debug!(table = %table, id = %candidate, attempt, "Allocated sequential id");
                return Ok(stored);
            }
            Err(e) if e.is_unique_violation_on(column) => {
                warn!(table = %table, id = %candidate, attempt, "Sequential id taken, retrying");
                taken.insert(candidate);
            }
            Err(e) => return Err(e),
        }
    }

    Err(StoreError::Conflict(format!(
        "could not allocate a {} id after {} attempts",
        scheme.name(),
        MAX_ALLOCATION_ATTEMPTS
    )))
}
