//! # Error Types
//!
//! Domain-specific error types for retail-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  retail-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  retail-store errors                                                   │
//! │  ├── StoreError       - Remote table failures                          │
//! │  └── IdentityError    - Identity provider failures                     │
//! │                                                                         │
//! │  retail-mail errors                                                    │
//! │  └── MailError        - Provider / queue failures                      │
//! │                                                                         │
//! │  HTTP errors (in app)                                                  │
//! │  └── ApiError         - What the client sees (JSON)                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → {"error": ...}         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::invitation::InvitationState;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Selling more than the shelf holds.
    ///
    /// ## When This Occurs
    /// ```text
    /// Sale line: #1001 × 5
    ///      │
    ///      ▼
    /// Product #1001 current_stock = 3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "#1001", available: 3, requested: 5 }
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Every candidate in an ID scheme's range is taken.
    #[error("No free {scheme} ID left in range {first}..={last}")]
    IdSpaceExhausted {
        scheme: String,
        first: u32,
        last: u32,
    },

    /// The invitation is not in a state that allows acceptance or resend.
    #[error("Invitation is {0}")]
    Invitation(InvitationState),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before any remote write happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too large (characters or bytes).
    #[error("{field} must be at most {max} {unit}")]
    TooLarge {
        field: String,
        max: usize,
        unit: &'static str,
    },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Invalid format (e.g., email, data URL).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {}", allowed.join(", "))]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two fields that must agree do not.
    #[error("{0}")]
    Mismatch(String),

    /// Password lacks a required character class.
    #[error("Password must contain at least one uppercase letter, one lowercase letter, and one number")]
    WeakPassword,

    /// Duplicate value (e.g., an email already on file).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// An update request that carries no fields.
    #[error("No data to update")]
    NothingToUpdate,
}

impl ValidationError {
    /// Creates a Required error for a field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Creates a MustBePositive error for a field.
    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
