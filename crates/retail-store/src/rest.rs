//! # PostgREST Backend
//!
//! [`TableClient`] over the hosted backend's REST interface
//! (`{SUPABASE_URL}/rest/v1/{table}`).
//!
//! ## Request Shapes
//! ```text
//! select  GET    /rest/v1/sales?select=*&status=eq.completed&order=sales_date.desc&limit=50
//! insert  POST   /rest/v1/sales                      Prefer: return=representation
//! update  PATCH  /rest/v1/products?id=eq.7&current_stock=eq.12
//!                                                    Prefer: return=representation
//! delete  DELETE /rest/v1/sales_items?sale_id=eq.3   Prefer: return=representation
//! ```
//!
//! Every request carries the service key twice: as `apikey` and as a
//! bearer token.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::client::{require_filters, TableClient};
use crate::error::{parse_key_detail, StoreError, StoreResult};
use crate::query::{check_filters, check_row, Filter, Row, Select, Table};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct RestTableClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

/// Error body PostgREST returns on failure.
#[derive(Debug, Deserialize, Default)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl RestTableClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> StoreResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| StoreError::ConnectionFailed(format!("bad backend url: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(RestTableClient {
            http,
            base,
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: Table) -> StoreResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::ConnectionFailed("backend url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["rest", "v1", table.name()]);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn rows(response: reqwest::Response) -> StoreResult<Vec<Row>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status.as_u16(), &body));
        }
        Ok(response.json::<Vec<Row>>().await?)
    }
}

#[async_trait]
impl TableClient for RestTableClient {
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
        query.validate()?;
        let url = self.table_url(query.table)?;
        debug!(table = %query.table, "REST select");

        let response = self
            .request(reqwest::Method::GET, url)
            .query(&query_pairs(query))
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn insert(&self, table: Table, row: Row) -> StoreResult<Row> {
        check_row(&row)?;
        let url = self.table_url(table)?;
        debug!(table = %table, "REST insert");

        let response = self
            .request(reqwest::Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        Self::rows(response)
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
        let url = self.table_url(table)?;

        let response = self
            .request(reqwest::Method::PATCH, url)
            .header("Prefer", "return=representation")
            .query(&filter_pairs(filters))
            .json(&changes)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<u64> {
        require_filters("delete", table, filters)?;
        check_filters(filters)?;
        let url = self.table_url(table)?;

        let mut pairs = filter_pairs(filters);
        pairs.push(("select".to_string(), "id".to_string()));

        let response = self
            .request(reqwest::Method::DELETE, url)
            .header("Prefer", "return=representation")
            .query(&pairs)
            .send()
            .await?;
        Ok(Self::rows(response).await?.len() as u64)
    }

    async fn health_check(&self) -> StoreResult<()> {
        let query = Select::from(Table::Products).columns(&["id"]).limit(1);
        self.select(&query).await.map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Query-string pairs for a select.
pub fn query_pairs(query: &Select) -> Vec<(String, String)> {
    let mut pairs = vec![(
        "select".to_string(),
        query
            .columns
            .as_ref()
            .map(|c| c.join(","))
            .unwrap_or_else(|| "*".to_string()),
    )];

    pairs.extend(filter_pairs(&query.filters));

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.descending { "desc" } else { "asc" }))
            .collect::<Vec<_>>()
            .join(",");
        pairs.push(("order".to_string(), order));
    }

    if let Some(limit) = query.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

pub fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| match f {
            Filter::Or(inner) => {
                let parts: Vec<String> = inner.iter().map(render_nested).collect();
                ("or".to_string(), format!("({})", parts.join(",")))
            }
            other => {
                let (column, op) = render_operator(other, false);
                (column, op)
            }
        })
        .collect()
}

/// `column.op.value` inside an `or=(...)` group.
fn render_nested(filter: &Filter) -> String {
    match filter {
        Filter::Or(inner) => {
            let parts: Vec<String> = inner.iter().map(render_nested).collect();
            format!("or({})", parts.join(","))
        }
        other => {
            let (column, op) = render_operator(other, true);
            format!("{}.{}", column, op)
        }
    }
}

fn render_operator(filter: &Filter, nested: bool) -> (String, String) {
    let scalar = |v: &Value| {
        let raw = plain(v);
        if nested {
            quote_reserved(&raw)
        } else {
            raw
        }
    };
    match filter {
        Filter::Eq(c, v) => (c.clone(), format!("eq.{}", scalar(v))),
        Filter::Neq(c, v) => (c.clone(), format!("neq.{}", scalar(v))),
        Filter::Gt(c, v) => (c.clone(), format!("gt.{}", scalar(v))),
        Filter::Gte(c, v) => (c.clone(), format!("gte.{}", scalar(v))),
        Filter::Lt(c, v) => (c.clone(), format!("lt.{}", scalar(v))),
        Filter::Lte(c, v) => (c.clone(), format!("lte.{}", scalar(v))),
        Filter::Like(c, p) => (c.clone(), format!("like.{}", wildcard(p, nested))),
        Filter::ILike(c, p) => (c.clone(), format!("ilike.{}", wildcard(p, nested))),
        Filter::In(c, vs) => {
            let list: Vec<String> = vs
                .iter()
                .map(|v| match v {
                    Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                    other => plain(other),
                })
                .collect();
            (c.clone(), format!("in.({})", list.join(",")))
        }
        Filter::IsNull(c) => (c.clone(), "is.null".to_string()),
        Filter::Or(_) => (String::new(), String::new()),
    }
}

fn plain(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Values containing PostgREST delimiters are double-quoted inside
/// logical groups.
fn quote_reserved(raw: &str) -> String {
    if raw.contains([',', '(', ')', ':', '"']) {
        format!("\"{}\"", raw.replace('"', "\\\""))
    } else {
        raw.to_string()
    }
}

/// `%` → `*`; escaped wildcards pass through.
fn wildcard(pattern: &str, nested: bool) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '%' => out.push('*'),
            other => out.push(other),
        }
    }
    if nested {
        quote_reserved(&out)
    } else {
        out
    }
}

fn map_error(status: u16, body: &str) -> StoreError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .unwrap_or_else(|| body.chars().take(200).collect());

    match parsed.code.as_deref() {
        Some("23505") => {
            let (field, value) = parse_key_detail(parsed.details.as_deref());
            StoreError::UniqueViolation { field, value }
        }
        Some("23503") => StoreError::ForeignKeyViolation {
            message: parsed.details.unwrap_or(message),
        },
        _ => {
            warn!(status, message = %message, "Backend request failed");
            StoreError::Http { status, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(q: &Select) -> Vec<(String, String)> {
        query_pairs(q)
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_select_rendering() {
        let q = Select::from(Table::Sales)
            .eq("status", "completed")
            .gte("sales_date", "2025-03-01T00:00:00+00:00")
            .order_by("sales_date", true)
            .limit(50);

        assert_eq!(
            pairs(&q),
            vec![
                pair("select", "*"),
                pair("status", "eq.completed"),
                pair("sales_date", "gte.2025-03-01T00:00:00+00:00"),
                pair("order", "sales_date.desc"),
                pair("limit", "50"),
            ]
        );
    }

    #[test]
    fn test_like_in_and_columns() {
        let q = Select::from(Table::Employees)
            .columns(&["employee_id"])
            .like("employee_id", "S%")
            .in_list("id", vec![json!(1), json!(2)]);

        assert_eq!(
            pairs(&q),
            vec![
                pair("select", "employee_id"),
                pair("employee_id", "like.S*"),
                pair("id", "in.(1,2)"),
            ]
        );

        let q = Select::from(Table::Products).in_list("category", vec![json!("Snacks")]);
        assert_eq!(pairs(&q)[1], pair("category", "in.(\"Snacks\")"));
    }

    #[test]
    fn test_or_group_quotes_reserved_values() {
        let q = Select::from(Table::Employees).or(vec![
            Filter::ilike("name", "%a,b%"),
            Filter::ilike("email", "%ab%"),
        ]);
        assert_eq!(
            pairs(&q)[1],
            pair("or", "(name.ilike.\"*a,b*\",email.ilike.*ab*)")
        );
    }

    #[test]
    fn test_error_mapping() {
        let err = map_error(
            409,
            r#"{"code":"23505","message":"duplicate key","details":"Key (sale_id)=(0004) already exists."}"#,
        );
        assert!(err.is_unique_violation_on("sale_id"));

        let err = map_error(409, r#"{"code":"23503","message":"fk","details":"still referenced"}"#);
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));

        let err = map_error(500, "gateway down");
        assert!(matches!(err, StoreError::Http { status: 500, .. }));
    }

    #[test]
    fn test_table_url() {
        let client = RestTableClient::new("https://demo.supabase.co", "key").unwrap();
        assert_eq!(
            client.table_url(Table::SalesItems).unwrap().as_str(),
            "https://demo.supabase.co/rest/v1/sales_items"
        );
    }
}
