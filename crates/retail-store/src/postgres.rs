//! # Direct Postgres Backend
//!
//! [`TableClient`] that talks to the database behind the REST interface
//! directly, through a sqlx pool.
//!
//! ## Typing Through the Table's Own Row Type
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Rows are JSON objects on this side and typed columns on the other.    │
//! │  Instead of mapping types by hand, every value is routed through       │
//! │  jsonb_populate_record(NULL::"table", ...), which casts it with the    │
//! │  column's declared type:                                               │
//! │                                                                         │
//! │  filter   t."current_stock" = (jsonb_populate_record(                  │
//! │               NULL::"products", $1))."current_stock"                     │
//! │  insert   INSERT INTO "products" AS t ("name", ...)                    │
//! │               SELECT "name", ... FROM jsonb_populate_record(...)       │
//! │  read     SELECT to_jsonb(t) AS row FROM "products" t ...              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row as _};
use std::time::Duration;
use tracing::{debug, info};

use crate::client::{require_filters, TableClient};
use crate::error::{StoreError, StoreResult};
use crate::migrations;
use crate::query::{check_filters, check_row, Filter, Row, Select, Table};

// =============================================================================
// Configuration
// =============================================================================

/// Pool configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = PgConfig::new("postgres://localhost/smartretail")
///     .max_connections(10)
///     .run_migrations(true);
/// ```
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub database_url: String,

    /// Default: 10
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Default: true
    pub run_migrations: bool,
}

impl PgConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        PgConfig {
            database_url: database_url.into(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct PgTableClient {
    pool: PgPool,
}

impl PgTableClient {
    /// Opens the pool and, if configured, applies pending migrations.
    pub async fn connect(config: PgConfig) -> StoreResult<Self> {
        info!(max_connections = config.max_connections, "Connecting to Postgres");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        if config.run_migrations {
            migrations::run_migrations(&pool).await?;
        }

        Ok(PgTableClient { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgTableClient { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_rows(&self, mut qb: QueryBuilder<'_, Postgres>) -> StoreResult<Vec<Row>> {
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| match r.try_get::<Value, _>("row")? {
                Value::Object(map) => Ok(map),
                other => Err(StoreError::Decode(format!("expected row object, got {}", other))),
            })
            .collect()
    }
}

fn quoted(ident: &str) -> String {
    format!("\"{}\"", ident)
}

/// `(jsonb_populate_record(NULL::"tbl", $n))."col"`
fn push_typed_value(qb: &mut QueryBuilder<'_, Postgres>, table: Table, column: &str, value: &Value) {
    qb.push("(jsonb_populate_record(NULL::")
        .push(quoted(table.name()))
        .push(", ")
        .push_bind(single_field(column, value))
        .push(")).")
        .push(quoted(column));
}

fn single_field(column: &str, value: &Value) -> Value {
    let mut row = Row::new();
    row.insert(column.to_string(), value.clone());
    Value::Object(row)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, table: Table, filter: &Filter) {
    let compare = |qb: &mut QueryBuilder<'_, Postgres>, c: &str, op: &str, v: &Value| {
        qb.push("t.").push(quoted(c)).push(op);
        push_typed_value(qb, table, c, v);
    };

    match filter {
        Filter::Eq(c, v) => compare(qb, c, " = ", v),
        Filter::Neq(c, v) => compare(qb, c, " <> ", v),
        Filter::Gt(c, v) => compare(qb, c, " > ", v),
        Filter::Gte(c, v) => compare(qb, c, " >= ", v),
        Filter::Lt(c, v) => compare(qb, c, " < ", v),
        Filter::Lte(c, v) => compare(qb, c, " <= ", v),
        Filter::Like(c, p) => {
            qb.push("t.").push(quoted(c)).push("::text LIKE ").push_bind(p.clone());
        }
        Filter::ILike(c, p) => {
            qb.push("t.").push(quoted(c)).push("::text ILIKE ").push_bind(p.clone());
        }
        Filter::In(c, vs) => {
            qb.push("t.")
                .push(quoted(c))
                .push(" = ANY(ARRAY(SELECT (jsonb_populate_record(NULL::")
                .push(quoted(table.name()))
                .push(", jsonb_build_object(")
                .push_bind(c.clone())
                .push(", e))).")
                .push(quoted(c))
                .push(" FROM jsonb_array_elements(")
                .push_bind(Value::Array(vs.clone()))
                .push(") AS e))");
        }
        Filter::IsNull(c) => {
            qb.push("t.").push(quoted(c)).push(" IS NULL");
        }
        Filter::Or(inner) => {
            if inner.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push("(");
            for (i, f) in inner.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_filter(qb, table, f);
            }
            qb.push(")");
        }
    }
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, table: Table, filters: &[Filter]) {
    for (i, f) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        push_filter(qb, table, f);
    }
}

fn has_updated_at(table: Table) -> bool {
    matches!(table, Table::Employees | Table::Products)
}

#[async_trait]
impl TableClient for PgTableClient {
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
        query.validate()?;

        let mut qb = QueryBuilder::new("SELECT to_jsonb(t) AS row FROM ");
        qb.push(quoted(query.table.name())).push(" AS t");
        push_where(&mut qb, query.table, &query.filters);

        for (i, o) in query.order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY " } else { ", " })
                .push("t.")
                .push(quoted(&o.column))
                .push(if o.descending { " DESC" } else { " ASC" })
                .push(" NULLS LAST");
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        debug!(table = %query.table, sql = qb.sql(), "Postgres select");
        let mut rows = self.fetch_rows(qb).await?;

        if let Some(columns) = &query.columns {
            for row in rows.iter_mut() {
                row.retain(|k, _| columns.iter().any(|c| c == k));
            }
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Row) -> StoreResult<Row> {
        check_row(&row)?;
        let name = quoted(table.name());

        let mut qb = QueryBuilder::new("INSERT INTO ");
        qb.push(&name).push(" AS t");
        if row.is_empty() {
            qb.push(" DEFAULT VALUES");
        } else {
            let columns = row.keys().map(|k| quoted(k)).collect::<Vec<_>>().join(", ");
            qb.push(" (")
                .push(&columns)
                .push(") SELECT ")
                .push(&columns)
                .push(" FROM jsonb_populate_record(NULL::")
                .push(&name)
                .push(", ")
                .push_bind(Value::Object(row))
                .push(")");
        }
        qb.push(" RETURNING to_jsonb(t) AS row");

        self.fetch_rows(qb)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        changes: Row,
    ) -> StoreResult<Vec<Row>> {
        require_filters("update", table, filters)?;
        check_filters(filters)?;
        check_row(&changes)?;
        if changes.is_empty() {
            return Err(StoreError::InvalidQuery("empty update".to_string()));
        }

        let name = quoted(table.name());
        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(&name).push(" AS t SET ");
        for (i, column) in changes.keys().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(quoted(column)).push(" = r.").push(quoted(column));
        }
        if has_updated_at(table) && !changes.contains_key("updated_at") {
            qb.push(", \"updated_at\" = now()");
        }
        qb.push(" FROM jsonb_populate_record(NULL::")
            .push(&name)
            .push(", ")
            .push_bind(Value::Object(changes))
            .push(") AS r");
        push_where(&mut qb, table, filters);
        qb.push(" RETURNING to_jsonb(t) AS row");

        self.fetch_rows(qb).await
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<u64> {
        require_filters("delete", table, filters)?;
        check_filters(filters)?;

        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(quoted(table.name())).push(" AS t");
        push_where(&mut qb, table, filters);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql_shape() {
        let query = Select::from(Table::Products)
            .eq("category", "Snacks")
            .or(vec![Filter::ilike("name", "%tea%"), Filter::IsNull("product_code".into())])
            .order_by("name", false)
            .limit(5);

        let mut qb = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t) AS row FROM ");
        qb.push(quoted(query.table.name())).push(" AS t");
        push_where(&mut qb, query.table, &query.filters);

        let sql = qb.sql();
        assert!(sql.starts_with("SELECT to_jsonb(t) AS row FROM \"products\" AS t WHERE t.\"category\" = (jsonb_populate_record(NULL::\"products\", $1)).\"category\""));
        assert!(sql.contains(" AND (t.\"name\"::text ILIKE $2 OR t.\"product_code\" IS NULL)"));
    }

    #[test]
    fn test_in_filter_binds_array() {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_filter(
            &mut qb,
            Table::Sales,
            &Filter::In("id".into(), vec![Value::from(1), Value::from(2)]),
        );
        let sql = qb.sql();
        assert!(sql.contains("= ANY(ARRAY(SELECT"));
        assert!(sql.contains("jsonb_array_elements($2)"));
    }
}
