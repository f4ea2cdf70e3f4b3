//! # retail-store: Remote Backend Layer for SmartRetail
//!
//! Everything the back-office reads or writes lives in a hosted relational
//! backend. This crate is the only code that talks to it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SmartRetail Data Flow                               │
//! │                                                                         │
//! │  HTTP handler → service (backoffice)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  retail-store (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐   │   │
//! │  │   │  Repositories │   │  TableClient   │   │  Identity     │   │   │
//! │  │   │               │   │                │   │               │   │   │
//! │  │   │ EmployeeRepo  │──►│ rest (default) │   │ GoTrue REST   │   │   │
//! │  │   │ ProductRepo   │   │ postgres       │   │ in-memory     │   │   │
//! │  │   │ SaleRepo      │   │ memory         │   │               │   │   │
//! │  │   └───────────────┘   └────────────────┘   └───────────────┘   │   │
//! │  │          │                                                      │   │
//! │  │          └── sequence: business IDs with unique-conflict retry  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Hosted Postgres (PostgREST + auth) or a plain Postgres instance       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - The `TableClient` trait and row conversion
//! - [`query`] - Backend-neutral select/filter model
//! - [`rest`], [`postgres`], [`memory`] - `TableClient` implementations
//! - [`sequence`] - Sequential business IDs
//! - [`repository`] - Typed repositories
//! - [`identity`] - Identity provider clients
//! - [`migrations`] - Embedded Postgres migrations
//! - [`demo`] - Demo catalogue and sales
//!
//! ## Usage
//!
//! ```rust,ignore
//! use retail_store::{Backend, BackendConfig};
//!
//! let backend = Backend::connect(&config).await?;
//! let employees = backend.employees().list(None, Some("aina")).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod client;
pub mod demo;
pub mod error;
pub mod identity;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod query;
pub mod repository;
pub mod rest;
pub mod sequence;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{Backend, BackendConfig, BackendKind};
pub use client::TableClient;
pub use error::{IdentityError, StoreError, StoreResult};
pub use identity::{
    AuthSession, AuthUser, IdentityAdmin, IdentityProvider, IdentityServices, MemoryIdentity,
    NewAccount,
};
pub use memory::MemoryTableClient;
pub use query::{Filter, Row, Select, Table};

pub use repository::employee::{EmployeeChanges, EmployeeRepository};
pub use repository::product::{ProductRepository, StockAdjustment};
pub use repository::sale::SaleRepository;
