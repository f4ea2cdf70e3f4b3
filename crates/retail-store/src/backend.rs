//! # Backend Handle
//!
//! Picks a [`TableClient`] implementation from configuration and hands out
//! repositories over it.
//!
//! ## Usage
//! ```rust,ignore
//! let backend = Backend::connect(&config).await?;
//! let product = backend.products().get_by_product_id("#1000").await?;
//! ```

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::client::TableClient;
use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryTableClient;
use crate::postgres::{PgConfig, PgTableClient};
use crate::repository::employee::EmployeeRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::rest::RestTableClient;

/// Which remote-table implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// PostgREST over HTTP.
    #[default]
    Rest,
    /// Direct sqlx pool.
    Postgres,
    /// Process memory; data is lost on exit.
    Memory,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "supabase" => Ok(BackendKind::Rest),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            "memory" => Ok(BackendKind::Memory),
            other => Err(StoreError::Internal(format!("unknown backend '{}'", other))),
        }
    }
}

/// Connection settings for every backend kind.
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Base URL of the hosted project (REST and identity).
    pub supabase_url: String,

    /// Public API key.
    pub supabase_key: String,

    /// Elevated key for admin identity calls; also preferred for table
    /// access when set.
    pub service_role_key: Option<String>,

    /// Required for [`BackendKind::Postgres`].
    pub database_url: Option<String>,

    /// Pool size for [`BackendKind::Postgres`].
    pub max_connections: Option<u32>,
}

// Keys and the database URL (which may carry a password) stay out of logs.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |set: bool| if set { "***" } else { "" };
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &redact(!self.supabase_key.is_empty()))
            .field("service_role_key", &redact(self.service_role_key.is_some()))
            .field("database_url", &redact(self.database_url.is_some()))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Shared handle over one [`TableClient`].
#[derive(Debug, Clone)]
pub struct Backend {
    tables: Arc<dyn TableClient>,
}

impl Backend {
    pub async fn connect(config: &BackendConfig) -> StoreResult<Self> {
        let tables: Arc<dyn TableClient> = match config.kind {
            BackendKind::Rest => {
                let key = config
                    .service_role_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .unwrap_or(&config.supabase_key);
                Arc::new(RestTableClient::new(&config.supabase_url, key)?)
            }
            BackendKind::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    StoreError::ConnectionFailed("DATABASE_URL is not set".to_string())
                })?;
                let mut pg = PgConfig::new(url);
                if let Some(max) = config.max_connections {
                    pg = pg.max_connections(max);
                }
                Arc::new(PgTableClient::connect(pg).await?)
            }
            BackendKind::Memory => Arc::new(MemoryTableClient::new()),
        };

        info!(backend = tables.backend_name(), "Remote backend ready");
        Ok(Backend { tables })
    }

    pub fn from_client(tables: Arc<dyn TableClient>) -> Self {
        Backend { tables }
    }

    pub fn in_memory() -> (Self, MemoryTableClient) {
        let client = MemoryTableClient::new();
        (Backend::from_client(Arc::new(client.clone())), client)
    }

    pub fn tables(&self) -> &Arc<dyn TableClient> {
        &self.tables
    }

    pub fn employees(&self) -> EmployeeRepository {
        EmployeeRepository::new(self.tables.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.tables.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.tables.clone())
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        self.tables.health_check().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.tables.backend_name()
    }
}
