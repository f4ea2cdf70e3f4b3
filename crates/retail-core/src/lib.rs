//! # retail-core: Pure Business Logic for the SmartRetail Back-Office
//!
//! Every business rule of the back-office lives here as a pure function
//! or a plain data type. Nothing in this crate touches the network, the
//! remote tables, or the clock (callers pass `now` in).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SmartRetail Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/backoffice (axum handlers)                 │   │
//! │  │     login, invitations, stock, employees, sales, report         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ retail-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  stock  │ │   ids    │ │ report │ │  rbac   │  │   │
//! │  │   │ Product │ │ status  │ │ M0001    │ │ months │ │ Role →  │  │   │
//! │  │   │  Sale   │ │ derive  │ │ #1000    │ │ best   │ │ perms   │  │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └────────┘ └─────────┘  │   │
//! │  │   ┌──────────┐ ┌────────────┐ ┌───────────┐                    │   │
//! │  │   │  money   │ │ invitation │ │validation │                    │   │
//! │  │   └──────────┘ └────────────┘ └───────────┘                    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             retail-store / retail-mail (adapters)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain rows (Employee, Product, Sale, SaleItem) and enums
//! - [`money`] - Integer-cent money with decimal wire format
//! - [`stock`] - Stock status derivation
//! - [`ids`] - Sequential, prefixed ID allocation
//! - [`invitation`] - Invitation token and state machine
//! - [`rbac`] - Role permission tables
//! - [`report`] - Report and dashboard aggregation
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use retail_core::stock::{derive_status, StockLevels};
//! use retail_core::types::StockStatus;
//!
//! let levels = StockLevels::new(5, 50, 10);
//! assert_eq!(derive_status(&levels), StockStatus::LowStock);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ids;
pub mod invitation;
pub mod money;
pub mod rbac;
pub mod report;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Hours an invitation token stays valid after it was sent.
pub const DEFAULT_INVITATION_EXPIRY_HOURS: i64 = 48;

/// Stock ceiling given to products created through "add stock".
pub const DEFAULT_MAX_STOCK: i64 = 50;

/// Low-stock threshold given to products created through "add stock".
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Largest accepted profile picture, measured after base64 decoding.
pub const MAX_PROFILE_PICTURE_BYTES: usize = 2 * 1024 * 1024;

/// Months shown in the report's profit/revenue trend.
pub const DEFAULT_REPORT_MONTHS: u32 = 7;

/// Share of the selling price assumed as unit cost when a product has none,
/// in basis points (3000 = 30%).
pub const FALLBACK_COST_BPS: i64 = 3000;

/// Display name used in outbound email and report headers.
pub const COMPANY_NAME: &str = "SmartRetail";
