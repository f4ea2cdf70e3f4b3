//! # Domain Types
//!
//! Row shapes of the four remote tables plus the enums stored in them.
//!
//! ## Table Relationships
//! ```text
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │  employees   │          │    sales     │ 1      * │ sales_items  │
//! │──────────────│          │──────────────│──────────│──────────────│
//! │ id           │          │ id           │          │ sale_id  ────┼──► sales.id
//! │ employee_id  │ M0001    │ sale_id      │ 0001     │ product_id ──┼──► products.id
//! │ email (uniq) │          │ total_amount │          │ quantity     │   (SET NULL)
//! │ role, status │          │ payment_meth │          │ unit_price   │
//! │ invitation_* │          │ status       │          │ subtotal     │
//! └──────────────┘          └──────────────┘          └──────────────┘
//!
//! ┌──────────────────────────────────────────┐
//! │ products                                 │
//! │ id, product_id (#1000), name, category,  │
//! │ price, cost?, current_stock, max_stock,  │
//! │ low_stock_threshold, status (derived)    │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Row structs deserialize straight from the JSON the table client returns.
//! `New*` structs are the insert payloads (no surrogate `id`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::invitation::InvitationRecord;
use crate::money::Money;
use crate::stock::StockLevels;
use crate::{DEFAULT_LOW_STOCK_THRESHOLD, DEFAULT_MAX_STOCK};

// =============================================================================
// Role
// =============================================================================

/// Employee role. Drives the employee ID prefix and the permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Sales,
    Supplier,
    Manager,
}

impl Role {
    /// All roles, in the order the employee list shows them.
    pub const ALL: [Role; 3] = [Role::Manager, Role::Supplier, Role::Sales];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sales => "Sales",
            Role::Supplier => "Supplier",
            Role::Manager => "Manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Sales" => Ok(Role::Sales),
            "Supplier" => Ok(Role::Supplier),
            "Manager" => Ok(Role::Manager),
            _ => Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: Role::ALL.iter().map(|r| r.as_str().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Employee Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    /// Invited, password not yet set.
    #[default]
    Pending,
    Active,
    Inactive,
    OnLeave,
}

// =============================================================================
// Stock Status
// =============================================================================

/// Derived inventory label, see [`crate::stock::derive_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    HighStock,
    /// Ordinary stock level. The stored label is historical; rows written
    /// by older tooling say `in_stock`.
    #[default]
    #[serde(alias = "in_stock")]
    Completed,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::HighStock => "high_stock",
            StockStatus::Completed => "completed",
        }
    }
}

// =============================================================================
// Sale Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Pending,
    /// Counted by every report and dashboard figure.
    #[default]
    Completed,
    Cancelled,
    Refunded,
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "CARD", alias = "card", alias = "Card")]
    Card,
    #[serde(rename = "CASH", alias = "cash", alias = "Cash")]
    Cash,
    #[serde(rename = "EWALLET", alias = "ewallet", alias = "Ewallet", alias = "E-Wallet")]
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Cash => "CASH",
            PaymentMethod::EWallet => "EWALLET",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "CARD" => Ok(PaymentMethod::Card),
            "CASH" => Ok(PaymentMethod::Cash),
            "EWALLET" => Ok(PaymentMethod::EWallet),
            "" => Err(ValidationError::required("payment_method")),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: vec!["CARD".into(), "CASH".into(), "EWALLET".into()],
            }),
        }
    }
}

// =============================================================================
// Employee
// =============================================================================

/// A row of the `employees` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    /// Role-prefixed business ID (`M0001`, `SP0002`, `S0010`).
    pub employee_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// `data:<mime>;base64,...`
    #[serde(default)]
    pub profile_picture: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub status: EmployeeStatus,
    #[serde(default)]
    pub invitation_token: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub invitation_sent_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub invitation_accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Employee {
    /// The invitation columns of this row.
    pub fn invitation(&self) -> InvitationRecord<'_> {
        InvitationRecord {
            token: self.invitation_token.as_deref(),
            sent_at: self.invitation_sent_at,
            accepted_at: self.invitation_accepted_at,
        }
    }
}

/// Insert payload for `employees`. `employee_id` is allocated on insert.
#[derive(Debug, Clone, Serialize)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub role: Role,
    pub status: EmployeeStatus,
    pub invitation_token: Option<String>,
    pub invitation_sent_at: Option<DateTime<Utc>>,
    pub hire_date: Option<NaiveDate>,
}

// =============================================================================
// Product
// =============================================================================

/// A row of the `products` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    /// Category-prefixed business ID (`#1000`).
    pub product_id: String,
    #[serde(default)]
    pub product_code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub price: Money,
    /// Unit cost; report falls back to a share of the price when absent.
    #[serde(default)]
    pub cost: Option<Money>,
    #[serde(default)]
    pub current_stock: i64,
    #[serde(default = "default_max_stock")]
    pub max_stock: i64,
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub status: StockStatus,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Current stock triple used by the status rule.
    pub fn levels(&self) -> StockLevels {
        StockLevels::new(self.current_stock, self.max_stock, self.low_stock_threshold)
    }
}

/// Insert payload for `products`. `product_id` is allocated on insert.
#[derive(Debug, Clone, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub price: Money,
    pub current_stock: i64,
    pub max_stock: i64,
    pub low_stock_threshold: i64,
    pub status: StockStatus,
}

fn default_max_stock() -> i64 {
    DEFAULT_MAX_STOCK
}

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_unit() -> String {
    "unit".to_string()
}

// =============================================================================
// Sale
// =============================================================================

/// A row of the `sales` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    /// Zero-padded sequential business ID (`0001`).
    pub sale_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(with = "timestamp")]
    pub sales_date: DateTime<Utc>,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: SaleStatus,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for `sales`. `sale_id` is allocated on insert.
#[derive(Debug, Clone, Serialize)]
pub struct NewSale {
    pub user_id: String,
    #[serde(with = "timestamp")]
    pub sales_date: DateTime<Utc>,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
}

/// Builds the short user tag stored on a sale: `#` and the first three
/// characters of the identity-provider user id.
pub fn sale_user_tag(user_id: &str) -> String {
    let short: String = user_id.chars().take(3).collect();
    format!("#{}", short)
}

// =============================================================================
// Sale Item
// =============================================================================

/// A row of the `sales_items` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: i64,
    /// Surrogate id of the owning sale.
    pub sale_id: i64,
    /// Surrogate id of the product; `None` once the product was deleted.
    #[serde(default)]
    pub product_id: Option<i64>,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// Insert payload for `sales_items`.
#[derive(Debug, Clone, Serialize)]
pub struct NewSaleItem {
    pub sale_id: i64,
    pub product_id: Option<i64>,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl From<&SaleItem> for NewSaleItem {
    fn from(item: &SaleItem) -> Self {
        NewSaleItem {
            sale_id: item.sale_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal,
        }
    }
}

// =============================================================================
// Timestamp serde
// =============================================================================

/// Lenient timestamp (de)serialization.
///
/// The hosted backend returns `timestamptz` columns as RFC 3339, but rows
/// written by older tooling hold naive ISO strings. Naive values are read
/// as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => s.serialize_str(&dt.to_rfc3339()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) if raw.is_empty() => Ok(None),
                Some(raw) => super::parse(&raw).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp: {}", raw))
                }),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("Cashier".parse::<Role>().is_err());
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert_eq!("E-Wallet".parse::<PaymentMethod>().unwrap(), PaymentMethod::EWallet);
        assert_eq!(
            "".parse::<PaymentMethod>().unwrap_err(),
            ValidationError::required("payment_method")
        );
    }

    #[test]
    fn test_product_row_defaults_and_legacy_status() {
        let product: Product = serde_json::from_value(json!({
            "id": 7,
            "product_id": "#1000",
            "name": "Mineral Water",
            "category": "Beverages",
            "price": "1.50",
            "current_stock": 12,
            "status": "in_stock"
        }))
        .unwrap();

        assert_eq!(product.max_stock, 50);
        assert_eq!(product.low_stock_threshold, 10);
        assert_eq!(product.unit, "unit");
        assert_eq!(product.price.cents(), 150);
        assert_eq!(product.status, StockStatus::Completed);
        assert!(product.cost.is_none());
    }

    #[test]
    fn test_naive_and_offset_timestamps_parse() {
        let a = timestamp::parse("2025-03-01T08:30:00.123456").unwrap();
        let b = timestamp::parse("2025-03-01T08:30:00.123456+00:00").unwrap();
        assert_eq!(a, b);
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_employee_row_with_invitation() {
        let employee: Employee = serde_json::from_value(json!({
            "id": 1,
            "employee_id": "S0001",
            "name": "Aina",
            "email": "aina@example.com",
            "role": "Sales",
            "status": "pending",
            "invitation_token": "tok",
            "invitation_sent_at": "2025-03-01T08:30:00+00:00",
            "invitation_accepted_at": null
        }))
        .unwrap();

        let invite = employee.invitation();
        assert_eq!(invite.token, Some("tok"));
        assert!(invite.sent_at.is_some());
        assert!(invite.accepted_at.is_none());
    }

    #[test]
    fn test_sale_user_tag() {
        assert_eq!(sale_user_tag("a1b2c3-uuid"), "#a1b");
        assert_eq!(sale_user_tag("ab"), "#ab");
    }
}
