//! # Store Error Types
//!
//! Error types for remote-table and identity-provider operations.
//!
//! ## Error Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Source                          StoreError                             │
//! │  ──────────────────────────────  ─────────────────────────────────────  │
//! │  Postgres SQLSTATE 23505         UniqueViolation { field, value }       │
//! │  PostgREST {"code":"23505"}      UniqueViolation { field, value }       │
//! │  SQLSTATE / code 23503           ForeignKeyViolation                    │
//! │  pool timeout / closed           ConnectionFailed                       │
//! │  reqwest connect / timeout       ConnectionFailed                       │
//! │  non-2xx from PostgREST          Http { status, message }               │
//! │  row JSON → struct failure       Decode                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use retail_core::CoreError;

/// Remote table operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Two requests allocated the same business ID
    /// - An email is already on file
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Backend unreachable.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The REST backend answered with a non-success status.
    #[error("Backend returned {status}: {message}")]
    Http { status: u16, message: String },

    /// A row did not match the expected shape.
    #[error("Could not decode row: {0}")]
    Decode(String),

    /// A query that the client refuses to run (bad identifier, unfiltered
    /// update or delete).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Concurrent writers kept winning a compare-and-set.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Business rule failure raised while writing.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Internal error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        StoreError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True for a unique violation on `column`, or on an unidentified
    /// column.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { field, .. }
            if field == column || field == UNKNOWN_FIELD)
    }
}

const UNKNOWN_FIELD: &str = "unknown";

/// Extracts `(field, value)` from a Postgres constraint detail such as
/// `Key (email)=(a@b.co) already exists.`
pub(crate) fn parse_key_detail(detail: Option<&str>) -> (String, String) {
    detail
        .and_then(|d| {
            let rest = d.strip_prefix("Key (")?;
            let (field, rest) = rest.split_once(")=(")?;
            let (value, _) = rest.rsplit_once(')')?;
            Some((field.to_string(), value.to_string()))
        })
        .unwrap_or_else(|| (UNKNOWN_FIELD.to_string(), UNKNOWN_FIELD.to_string()))
}

/// Convert sqlx errors to StoreError.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let detail = db_err
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .map(str::to_owned);

                match db_err.code().as_deref() {
                    Some("23505") => {
                        let (field, value) = parse_key_detail(detail.as_deref());
                        StoreError::UniqueViolation { field, value }
                    }
                    Some("23503") => StoreError::ForeignKeyViolation {
                        message: detail.unwrap_or_else(|| db_err.message().to_string()),
                    },
                    _ => StoreError::QueryFailed(db_err.message().to_string()),
                }
            }

            sqlx::Error::PoolTimedOut => {
                StoreError::ConnectionFailed("Connection pool exhausted".to_string())
            }

            sqlx::Error::PoolClosed => StoreError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Migrate(e) => StoreError::MigrationFailed(e.to_string()),

            _ => StoreError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            StoreError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

// =============================================================================
// Identity Error
// =============================================================================

/// Identity provider failures.
///
/// Providers report these as free text; they are classified once, here,
/// instead of string-matching in every handler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address has not been confirmed")]
    EmailNotConfirmed,

    #[error("An account with this email already exists")]
    AlreadyRegistered,

    #[error("Identity provider unreachable: {0}")]
    Network(String),

    #[error("Identity provider error ({status}): {message}")]
    Provider { status: u16, message: String },
}

impl IdentityError {
    /// Classifies a provider error message.
    pub fn classify(status: u16, message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("not confirmed") {
            IdentityError::EmailNotConfirmed
        } else if lower.contains("already") || lower.contains("exists") {
            IdentityError::AlreadyRegistered
        } else if lower.contains("invalid") {
            IdentityError::InvalidCredentials
        } else {
            IdentityError::Provider {
                status,
                message: message.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            IdentityError::Network(err.to_string())
        } else {
            IdentityError::Provider {
                status: err.status().map(|s| s.as_u16()).unwrap_or(500),
                message: err.to_string(),
            }
        }
    }
}

/// Convenience type alias for Results with StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
