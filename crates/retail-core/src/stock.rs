//! # Stock Module
//!
//! Stock status derivation and clamped stock arithmetic.
//!
//! ## The Rule
//! ```text
//! current == 0            → out_of_stock
//! current <= threshold    → low_stock
//! current >= max          → high_stock
//! otherwise               → completed   (ordinary level)
//! ```
//! Checked top to bottom, so a product whose threshold is above its max
//! still reports `low_stock` first. Inventory and reporting share this one
//! function; every stock mutation writes its result back to `status`.

use serde::{Deserialize, Serialize};

use crate::types::StockStatus;

/// The three numbers the status rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub current: i64,
    pub max: i64,
    pub threshold: i64,
}

impl StockLevels {
    pub const fn new(current: i64, max: i64, threshold: i64) -> Self {
        Self {
            current,
            max,
            threshold,
        }
    }

    /// Applies a signed delta, clamping at zero.
    pub fn adjusted(self, delta: i64) -> Self {
        Self {
            current: apply_delta(self.current, delta),
            ..self
        }
    }

    pub fn status(&self) -> StockStatus {
        derive_status(self)
    }

    pub fn is_low(&self) -> bool {
        self.current <= self.threshold
    }

    /// current / threshold; orders the dashboard's low-stock list.
    pub fn fill_ratio(&self) -> f64 {
        if self.threshold > 0 {
            self.current as f64 / self.threshold as f64
        } else {
            self.current as f64
        }
    }

    /// `"{current}/{threshold}"`
    pub fn display(&self) -> String {
        format!("{}/{}", self.current, self.threshold)
    }
}

/// Derives the stock label for a product.
pub fn derive_status(levels: &StockLevels) -> StockStatus {
    if levels.current <= 0 {
        StockStatus::OutOfStock
    } else if levels.current <= levels.threshold {
        StockStatus::LowStock
    } else if levels.current >= levels.max {
        StockStatus::HighStock
    } else {
        StockStatus::Completed
    }
}

/// Adds `delta` to `current`, never going below zero.
pub fn apply_delta(current: i64, delta: i64) -> i64 {
    current.saturating_add(delta).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(current: i64, max: i64, threshold: i64) -> StockStatus {
        derive_status(&StockLevels::new(current, max, threshold))
    }

    #[test]
    fn test_boundaries_with_default_levels() {
        // max 50, threshold 10
        assert_eq!(status(0, 50, 10), StockStatus::OutOfStock);
        assert_eq!(status(1, 50, 10), StockStatus::LowStock);
        assert_eq!(status(10, 50, 10), StockStatus::LowStock);
        assert_eq!(status(11, 50, 10), StockStatus::Completed);
        assert_eq!(status(49, 50, 10), StockStatus::Completed);
        assert_eq!(status(50, 50, 10), StockStatus::HighStock);
        assert_eq!(status(51, 50, 10), StockStatus::HighStock);
    }

    #[test]
    fn test_rule_order_exhaustively() {
        // Every triple over a small grid that includes the boundaries
        for max in 0..=12 {
            for threshold in 0..=12 {
                for current in 0..=14 {
                    let expected = if current == 0 {
                        StockStatus::OutOfStock
                    } else if current <= threshold {
                        StockStatus::LowStock
                    } else if current >= max {
                        StockStatus::HighStock
                    } else {
                        StockStatus::Completed
                    };
                    assert_eq!(
                        status(current, max, threshold),
                        expected,
                        "current={} max={} threshold={}",
                        current,
                        max,
                        threshold
                    );
                }
            }
        }
    }

    #[test]
    fn test_threshold_wins_over_max() {
        // threshold above max: low stock is checked first
        assert_eq!(status(20, 15, 25), StockStatus::LowStock);
    }

    #[test]
    fn test_apply_delta_clamps_at_zero() {
        assert_eq!(apply_delta(5, -3), 2);
        assert_eq!(apply_delta(2, -3), 0);
        assert_eq!(apply_delta(0, 7), 7);
        assert_eq!(apply_delta(i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn test_sale_round_trip_example() {
        let levels = StockLevels::new(5, 50, 10);
        assert_eq!(levels.status(), StockStatus::LowStock);

        let after_sale = levels.adjusted(-3);
        assert_eq!(after_sale.current, 2);
        assert_eq!(after_sale.status(), StockStatus::LowStock);

        let after_delete = after_sale.adjusted(3);
        assert_eq!(after_delete, levels);
    }

    #[test]
    fn test_fill_ratio_and_display() {
        let levels = StockLevels::new(3, 50, 12);
        assert!((levels.fill_ratio() - 0.25).abs() < f64::EPSILON);
        assert_eq!(levels.display(), "3/12");
        assert!(levels.is_low());
    }
}
