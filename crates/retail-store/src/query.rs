//! # Query Model
//!
//! A small, backend-neutral description of the queries the back-office
//! issues against its four tables. Each [`TableClient`](crate::TableClient)
//! renders it in its own dialect.
//!
//! ## Rendering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Filter                PostgREST param          Postgres SQL            │
//! │  ────────────────────  ───────────────────────  ─────────────────────── │
//! │  Eq("role", "Sales")   role=eq.Sales            t."role" = $1           │
//! │  Gte("sales_date", d)  sales_date=gte.d         t."sales_date" >= $1    │
//! │  ILike("name", "%a%")  name=ilike.*a*           t."name"::text ILIKE $1 │
//! │  In("id", [1,2])       id=in.(1,2)              t."id" = ANY(...)       │
//! │  Or([..])              or=(name.ilike.*a*,...)  ( .. OR .. )            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::error::{StoreError, StoreResult};

/// A row as it travels between the store and a backend.
pub type Row = Map<String, Value>;

// =============================================================================
// Table
// =============================================================================

/// The four remote tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Employees,
    Products,
    Sales,
    SalesItems,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Employees,
        Table::Products,
        Table::Sales,
        Table::SalesItems,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Employees => "employees",
            Table::Products => "products",
            Table::Sales => "sales",
            Table::SalesItems => "sales_items",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Filter
// =============================================================================

/// Row predicate. Patterns for `Like`/`ILike` use SQL wildcards (`%`, `_`).
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Like(String, String),
    ILike(String, String),
    In(String, Vec<Value>),
    IsNull(String),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn ilike(column: &str, pattern: impl Into<String>) -> Self {
        Filter::ILike(column.to_string(), pattern.into())
    }

    /// Columns referenced by this filter, nested ones included.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::Like(c, _)
            | Filter::ILike(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c) => vec![c.as_str()],
            Filter::Or(inner) => inner.iter().flat_map(Filter::columns).collect(),
        }
    }
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

// =============================================================================
// Select
// =============================================================================

/// A SELECT against one table. Filters combine with AND.
///
/// ```rust
/// use retail_store::query::{Select, Table};
///
/// let q = Select::from(Table::Sales)
///     .eq("status", "completed")
///     .order_by("sales_date", true)
///     .limit(50);
/// assert_eq!(q.filters.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: Table,
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<u32>,
}

impl Select {
    pub fn from(table: Table) -> Self {
        Select {
            table,
            columns: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    /// Restricts the returned columns.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.to_string(), value.into()))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(column.to_string(), value.into()))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(column.to_string(), value.into()))
    }

    pub fn like(self, column: &str, pattern: impl Into<String>) -> Self {
        self.filter(Filter::Like(column.to_string(), pattern.into()))
    }

    pub fn in_list(self, column: &str, values: Vec<Value>) -> Self {
        self.filter(Filter::In(column.to_string(), values))
    }

    pub fn or(self, alternatives: Vec<Filter>) -> Self {
        self.filter(Filter::Or(alternatives))
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks every identifier this query will splice into a request.
    pub fn validate(&self) -> StoreResult<()> {
        if let Some(cols) = &self.columns {
            for c in cols {
                check_identifier(c)?;
            }
        }
        check_filters(&self.filters)?;
        for o in &self.order {
            check_identifier(&o.column)?;
        }
        Ok(())
    }
}

// =============================================================================
// Identifiers
// =============================================================================

fn identifier_regex() -> &'static Regex {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    IDENT_RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("identifier pattern compiles"))
}

/// Column names are spliced into SQL and URLs, so only plain snake_case
/// identifiers are accepted.
pub fn check_identifier(name: &str) -> StoreResult<()> {
    if identifier_regex().is_match(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!("bad column name '{}'", name)))
    }
}

pub fn check_filters(filters: &[Filter]) -> StoreResult<()> {
    for f in filters {
        for c in f.columns() {
            check_identifier(c)?;
        }
    }
    Ok(())
}

pub fn check_row(row: &Row) -> StoreResult<()> {
    for key in row.keys() {
        check_identifier(key)?;
    }
    Ok(())
}

/// Escapes SQL wildcards so user text matches literally inside a LIKE
/// pattern.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `%text%` with `text` escaped.
pub fn contains_pattern(text: &str) -> String {
    format!("%{}%", escape_like(text))
}
