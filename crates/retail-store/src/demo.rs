//! # Demo Data
//!
//! Deterministic catalogue and sales history for local runs: the `seed`
//! binary writes it to a real backend, and the server loads it into the
//! memory backend on startup when asked to.
//!
//! Each product gets:
//! - a category-prefixed ID (`#1000`, `#2000`, ...)
//! - a price of RM1.50 - RM9.49 and a recorded cost on two of every three
//! - stock anywhere from empty to above the maximum, so every status shows up

use chrono::{Duration, Utc};
use tracing::info;

use retail_core::stock::{derive_status, StockLevels};
use retail_core::types::{NewProduct, NewSale, NewSaleItem, PaymentMethod, Product, SaleStatus};
use retail_core::{Money, DEFAULT_LOW_STOCK_THRESHOLD, DEFAULT_MAX_STOCK};

use crate::backend::Backend;
use crate::error::StoreResult;
use crate::query::Row;

/// Catalogue per known category.
pub const CATALOGUE: &[(&str, &[&str])] = &[
    (
        "Beverages",
        &["Mineral Water 1.5L", "Teh Tarik Can", "Orange Juice", "Iced Coffee", "Soy Milk"],
    ),
    (
        "Bakery & Snacks",
        &["Wholemeal Bread", "Kaya Puff", "Potato Chips", "Cream Crackers", "Chocolate Wafer"],
    ),
    (
        "Health & Medicine",
        &["Paracetamol 500mg", "Vitamin C", "Plaster Strips", "Antiseptic Cream"],
    ),
    ("Stationery", &["Ballpoint Pen", "A4 Notebook", "Glue Stick", "Highlighter Set"]),
    (
        "Personal Care & Hygiene",
        &["Shampoo 400ml", "Toothpaste", "Hand Soap", "Facial Tissue"],
    ),
];

const PAYMENT_METHODS: [PaymentMethod; 3] =
    [PaymentMethod::Cash, PaymentMethod::Card, PaymentMethod::EWallet];

/// Inserts the catalogue. Returns the stored products.
pub async fn seed_catalogue(backend: &Backend) -> StoreResult<Vec<Product>> {
    let products = backend.products();
    let mut stored = Vec::new();

    for (category, names) in CATALOGUE {
        for name in names.iter() {
            let seed = stored.len();
            let price = Money::from_cents(150 + ((seed * 37) % 800) as i64);
            let current_stock = ((seed * 13) % 70) as i64;

            let new = NewProduct {
                name: name.to_string(),
                category: category.to_string(),
                price,
                current_stock,
                max_stock: DEFAULT_MAX_STOCK,
                low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
                status: derive_status(&StockLevels::new(
                    current_stock,
                    DEFAULT_MAX_STOCK,
                    DEFAULT_LOW_STOCK_THRESHOLD,
                )),
            };
            let mut product = products.create(&new).await?;

            if seed % 3 != 0 {
                let mut changes = Row::new();
                let cost = price.share_bps(6000 + (seed % 20) as i64 * 100);
                changes.insert("cost".into(), serde_json::to_value(cost)?);
                product = products.update_fields(&product.product_id, changes).await?;
            }
            stored.push(product);
        }
    }

    info!(count = stored.len(), "Seeded catalogue");
    Ok(stored)
}

/// Records `per_day` completed sales on each of the last `days` days.
///
/// Sales are written directly and do not move stock.
pub async fn seed_sales(
    backend: &Backend,
    products: &[Product],
    days: i64,
    per_day: usize,
) -> StoreResult<usize> {
    if products.is_empty() {
        return Ok(0);
    }

    let sales = backend.sales();
    let now = Utc::now();
    let mut created = 0;

    for day in 0..days {
        for n in 0..per_day {
            let seed = (day as usize) * per_day + n;
            let product = &products[(seed * 7) % products.len()];
            let quantity = 1 + (seed % 4) as i64;
            let subtotal = product.price * quantity;

            let sale = sales
                .create(&NewSale {
                    user_id: "#dem".to_string(),
                    sales_date: now - Duration::days(day) - Duration::minutes((n * 47) as i64),
                    total_amount: subtotal,
                    payment_method: PAYMENT_METHODS[seed % PAYMENT_METHODS.len()],
                    status: SaleStatus::Completed,
                })
                .await?;

            sales
                .insert_item(&NewSaleItem {
                    sale_id: sale.id,
                    product_id: Some(product.id),
                    quantity,
                    unit_price: product.price,
                    subtotal,
                })
                .await?;
            created += 1;
        }
    }

    info!(count = created, days, "Seeded sales history");
    Ok(created)
}
