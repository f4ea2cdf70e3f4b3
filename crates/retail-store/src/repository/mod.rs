//! # Repository Module
//!
//! Typed access to the four remote tables.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service                                                                │
//! │     │  backend.products().adjust_stock(&product, -3)                    │
//! │     ▼                                                                   │
//! │  ProductRepository        EmployeeRepository        SaleRepository      │
//! │     │  Select / Filter / Row                                            │
//! │     ▼                                                                   │
//! │  Arc<dyn TableClient>  (rest | postgres | memory)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups return `Ok(None)` for a missing row; writes aimed at one row
//! return [`StoreError::NotFound`](crate::StoreError::NotFound) when
//! nothing matched.

pub mod employee;
pub mod product;
pub mod sale;
