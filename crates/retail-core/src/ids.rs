//! # Sequential ID Allocation
//!
//! Business IDs are short, human-typed codes: a prefix plus a zero-padded
//! number. Allocation scans the IDs already taken under the same prefix and
//! returns the lowest free number.
//!
//! ## Schemes
//! ```text
//! ┌──────────┬──────────────────────────────┬──────────┬─────────────┐
//! │ Scheme   │ Prefix                       │ Format   │ Range       │
//! ├──────────┼──────────────────────────────┼──────────┼─────────────┤
//! │ Employee │ Manager M, Supplier SP,      │ M0001    │ 1..=9999    │
//! │          │ Sales S                      │          │             │
//! │ Product  │ '#' + category digit         │ #1000    │ 0..=999     │
//! │ Sale     │ (none)                       │ 0001     │ 1..=99999   │
//! └──────────┴──────────────────────────────┴──────────┴─────────────┘
//! ```
//!
//! The allocator is pure: the caller supplies the taken set. Concurrent
//! callers can pick the same candidate; `retail-store` resolves that with
//! the backend's unique constraints and a bounded retry that adds the lost
//! candidate to the taken set.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::types::Role;

/// Category names with a dedicated product ID digit.
pub const KNOWN_CATEGORIES: [(&str, char); 5] = [
    ("Beverages", '1'),
    ("Bakery & Snacks", '2'),
    ("Health & Medicine", '3'),
    ("Stationery", '4'),
    ("Personal Care & Hygiene", '5'),
];

/// Digit used for categories outside [`KNOWN_CATEGORIES`].
pub const OTHER_CATEGORY_DIGIT: char = '9';

/// Returns the product ID digit for a category name.
pub fn category_digit(category: &str) -> char {
    KNOWN_CATEGORIES
        .iter()
        .find(|(name, _)| *name == category.trim())
        .map(|(_, digit)| *digit)
        .unwrap_or(OTHER_CATEGORY_DIGIT)
}

/// Returns the employee ID prefix for a role.
pub fn role_prefix(role: Role) -> &'static str {
    match role {
        Role::Manager => "M",
        Role::Supplier => "SP",
        Role::Sales => "S",
    }
}

/// A prefix, a pad width and an inclusive number range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdScheme {
    name: &'static str,
    prefix: String,
    width: usize,
    first: u32,
    last: u32,
}

impl IdScheme {
    pub fn employee(role: Role) -> Self {
        Self {
            name: "employee",
            prefix: role_prefix(role).to_string(),
            width: 4,
            first: 1,
            last: 9_999,
        }
    }

    pub fn product(category: &str) -> Self {
        Self {
            name: "product",
            prefix: format!("#{}", category_digit(category)),
            width: 3,
            first: 0,
            last: 999,
        }
    }

    pub fn sale() -> Self {
        Self {
            name: "sale",
            prefix: String::new(),
            width: 4,
            first: 1,
            last: 99_999,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// SQL `LIKE` pattern matching every ID this scheme can produce.
    pub fn like_pattern(&self) -> String {
        format!("{}%", self.prefix)
    }

    /// Renders candidate number `n`.
    pub fn format(&self, n: u32) -> String {
        format!("{}{:0width$}", self.prefix, n, width = self.width)
    }

    /// Returns the lowest candidate not present in `taken`.
    ///
    /// ## Example
    /// ```rust
    /// use retail_core::ids::IdScheme;
    /// use retail_core::types::Role;
    ///
    /// let scheme = IdScheme::employee(Role::Manager);
    /// let id = scheme.allocate(["M0001", "M0003"]).unwrap();
    /// assert_eq!(id, "M0002");
    /// ```
    pub fn allocate<'a, I>(&self, taken: I) -> CoreResult<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let taken: HashSet<&str> = taken.into_iter().collect();

        (self.first..=self.last)
            .map(|n| self.format(n))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .ok_or_else(|| CoreError::IdSpaceExhausted {
                scheme: self.name.to_string(),
                first: self.first,
                last: self.last,
            })
    }
}
