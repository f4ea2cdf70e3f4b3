//! # Report Aggregation
//!
//! In-memory aggregation behind the report page and the dashboard. The
//! store layer fetches rows for a date window; everything here is a pure
//! loop-and-accumulate over those rows.
//!
//! ## Data Flow
//! ```text
//! sales (completed, window) ─┐
//! sales_items (in sale ids) ─┼─► join_lines() ─► [SaleLine] ─┬─► best_products()
//! products (in product ids) ─┘                               ├─► best_categories()
//!                                                            └─► monthly_financials()
//! ```
//!
//! Windows are half-open `[start, end)` in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::money::Money;
use crate::stock::StockLevels;
use crate::types::{Employee, EmployeeStatus, Product, Sale, SaleItem};
use crate::FALLBACK_COST_BPS;

// =============================================================================
// Percentages
// =============================================================================

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Period-over-period change used by the report.
///
/// `(current - previous) / previous × 100` rounded to one decimal. With no
/// previous figure the change is 100% when anything was sold, else 0%.
pub fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    round1((current - previous) / previous * 100.0)
}

/// Today-vs-yesterday figure on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison<T> {
    pub today: T,
    pub yesterday: T,
    pub percentage: f64,
    pub is_positive: bool,
}

/// Builds a dashboard comparison. Unlike [`percentage_change`], an empty
/// yesterday reports 0% and counts as positive.
pub fn day_over_day<T: Copy>(today: T, yesterday: T, as_f64: impl Fn(T) -> f64) -> Comparison<T> {
    let (t, y) = (as_f64(today), as_f64(yesterday));
    if y > 0.0 {
        let change = (t - y) / y * 100.0;
        Comparison {
            today,
            yesterday,
            percentage: round1(change),
            is_positive: change >= 0.0,
        }
    } else {
        Comparison {
            today,
            yesterday,
            percentage: 0.0,
            is_positive: true,
        }
    }
}

// =============================================================================
// Date Windows
// =============================================================================

/// Half-open UTC time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
}

/// Year and month `back` months before (`year`, `month`).
fn months_back(year: i32, month: u32, back: u32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) - back as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// The whole calendar day containing `date`.
pub fn day_window(date: NaiveDate) -> Period {
    let start = midnight(date);
    Period {
        start,
        end: start + Duration::days(1),
    }
}

/// The whole calendar month.
pub fn month_window(year: i32, month: u32) -> Period {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Period {
        start: midnight(first_of_month(year, month)),
        end: midnight(first_of_month(next_year, next_month)),
    }
}

/// Current month so far and the whole previous month.
pub fn current_and_previous_month(now: DateTime<Utc>) -> (Period, Period) {
    let current = Period {
        start: midnight(first_of_month(now.year(), now.month())),
        end: now + Duration::seconds(1),
    };
    let (py, pm) = months_back(now.year(), now.month(), 1);
    (current, month_window(py, pm))
}

/// A labelled month in the trend chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthWindow {
    /// `%b`, e.g. `Jan`.
    pub label: String,
    pub period: Period,
}

/// The trailing `months` calendar months ending with the current one,
/// oldest first.
pub fn trailing_months(now: DateTime<Utc>, months: u32) -> Vec<MonthWindow> {
    (0..months)
        .rev()
        .map(|back| {
            let (year, month) = months_back(now.year(), now.month(), back);
            MonthWindow {
                label: first_of_month(year, month).format("%b").to_string(),
                period: month_window(year, month),
            }
        })
        .collect()
}

/// Running-total periods shown on the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalsPeriod {
    Today,
    /// From Monday of the current week.
    Week,
    Month,
}

impl TotalsPeriod {
    pub fn window(&self, now: DateTime<Utc>) -> Period {
        let today = now.date_naive();
        let start = match self {
            TotalsPeriod::Today => today,
            TotalsPeriod::Week => {
                today - Duration::days(today.weekday().num_days_from_monday() as i64)
            }
            TotalsPeriod::Month => first_of_month(today.year(), today.month()),
        };
        Period {
            start: midnight(start),
            end: now + Duration::seconds(1),
        }
    }
}

// =============================================================================
// Joined Lines
// =============================================================================

/// One sale item with its sale date and (if it still exists) its product.
#[derive(Debug, Clone, Copy)]
pub struct SaleLine<'a> {
    pub sold_at: DateTime<Utc>,
    pub item: &'a SaleItem,
    pub product: Option<&'a Product>,
}

impl SaleLine<'_> {
    /// Cost of goods for this line: recorded unit cost, or a fixed share of
    /// the selling price when the product has none.
    pub fn cost(&self) -> Money {
        match self.product.and_then(|p| p.cost) {
            Some(unit_cost) => unit_cost * self.item.quantity,
            None => (self.item.unit_price * self.item.quantity).share_bps(FALLBACK_COST_BPS),
        }
    }
}

/// Joins items to their sale (by surrogate id) and product.
///
/// Items whose sale is not in `sales` are dropped.
pub fn join_lines<'a>(
    sales: &'a [Sale],
    items: &'a [SaleItem],
    products: &'a [Product],
) -> Vec<SaleLine<'a>> {
    let sold_at: HashMap<i64, DateTime<Utc>> =
        sales.iter().map(|s| (s.id, s.sales_date)).collect();
    let by_id: HashMap<i64, &Product> = products.iter().map(|p| (p.id, p)).collect();

    items
        .iter()
        .filter_map(|item| {
            sold_at.get(&item.sale_id).map(|at| SaleLine {
                sold_at: *at,
                item,
                product: item.product_id.and_then(|id| by_id.get(&id).copied()),
            })
        })
        .collect()
}

// =============================================================================
// Best Sellers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPerformance {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub total_sold: i64,
    pub turnover: Money,
    pub increase_by: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPerformance {
    pub category: String,
    pub turnover: Money,
    pub increase_by: f64,
}

/// Top products of `current` by turnover, compared against `previous`.
/// Lines whose product was deleted are not attributed.
pub fn best_products(
    current: &[SaleLine<'_>],
    previous: &[SaleLine<'_>],
    limit: usize,
) -> Vec<ProductPerformance> {
    let mut now: HashMap<&str, ProductPerformance> = HashMap::new();
    for line in current {
        let Some(product) = line.product else { continue };
        let entry = now
            .entry(product.product_id.as_str())
            .or_insert_with(|| ProductPerformance {
                product_id: product.product_id.clone(),
                product_name: product.name.clone(),
                category: product.category.clone(),
                total_sold: 0,
                turnover: Money::zero(),
                increase_by: 0.0,
            });
        entry.total_sold += line.item.quantity;
        entry.turnover += line.item.subtotal;
    }

    let mut before: HashMap<&str, Money> = HashMap::new();
    for line in previous {
        if let Some(product) = line.product {
            *before.entry(product.product_id.as_str()).or_default() += line.item.subtotal;
        }
    }

    let mut ranked: Vec<ProductPerformance> = now
        .into_iter()
        .map(|(key, mut perf)| {
            let prev = before.get(key).copied().unwrap_or_default();
            perf.increase_by = percentage_change(perf.turnover.as_decimal(), prev.as_decimal());
            perf
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.turnover
            .cmp(&a.turnover)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    ranked.truncate(limit);
    ranked
}

/// Top categories of `current` by turnover, compared against `previous`.
pub fn best_categories(
    current: &[SaleLine<'_>],
    previous: &[SaleLine<'_>],
    limit: usize,
) -> Vec<CategoryPerformance> {
    fn by_category<'a>(lines: &[SaleLine<'a>]) -> HashMap<&'a str, Money> {
        let mut totals: HashMap<&str, Money> = HashMap::new();
        for line in lines {
            if let Some(product) = line.product {
                *totals.entry(product.category.as_str()).or_default() += line.item.subtotal;
            }
        }
        totals
    }

    let before = by_category(previous);
    let mut ranked: Vec<CategoryPerformance> = by_category(current)
        .into_iter()
        .map(|(category, turnover)| {
            let prev = before.get(category).copied().unwrap_or_default();
            CategoryPerformance {
                category: category.to_string(),
                turnover,
                increase_by: percentage_change(turnover.as_decimal(), prev.as_decimal()),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.turnover
            .cmp(&a.turnover)
            .then_with(|| a.category.cmp(&b.category))
    });
    ranked.truncate(limit);
    ranked
}

// =============================================================================
// Monthly Financials
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSummary {
    pub label: String,
    pub revenue: Money,
    pub cost: Money,
    pub profit: Money,
}

/// Sums revenue (line subtotals), cost and profit for each month window.
pub fn monthly_financials(lines: &[SaleLine<'_>], months: &[MonthWindow]) -> Vec<MonthSummary> {
    months
        .iter()
        .map(|month| {
            let (revenue, cost) = lines
                .iter()
                .filter(|line| month.period.contains(line.sold_at))
                .fold((Money::zero(), Money::zero()), |(rev, cost), line| {
                    (rev + line.item.subtotal, cost + line.cost())
                });
            MonthSummary {
                label: month.label.clone(),
                revenue,
                cost,
                profit: revenue - cost,
            }
        })
        .collect()
}

/// Sum of sale totals.
pub fn total_amount<'a>(sales: impl IntoIterator<Item = &'a Sale>) -> Money {
    sales.into_iter().map(|s| s.total_amount).sum()
}

// =============================================================================
// Low Stock
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockEntry {
    pub product_id: String,
    pub product_name: String,
    /// `"{current}/{threshold}"`
    pub quantity: String,
    pub current_stock: i64,
    pub low_stock_threshold: i64,
}

impl From<&Product> for LowStockEntry {
    fn from(p: &Product) -> Self {
        LowStockEntry {
            product_id: p.product_id.clone(),
            product_name: p.name.clone(),
            quantity: p.levels().display(),
            current_stock: p.current_stock,
            low_stock_threshold: p.low_stock_threshold,
        }
    }
}

/// Report ordering: fewest units first.
pub fn low_stock_by_quantity(products: &[Product], limit: usize) -> Vec<LowStockEntry> {
    let mut low: Vec<&Product> = products.iter().filter(|p| p.levels().is_low()).collect();
    low.sort_by_key(|p| p.current_stock);
    low.into_iter().take(limit).map(LowStockEntry::from).collect()
}

/// Dashboard ordering: lowest fill ratio (current / threshold) first.
pub fn low_stock_by_ratio(products: &[Product], limit: usize) -> Vec<LowStockEntry> {
    let mut low: Vec<(f64, &Product)> = products
        .iter()
        .map(|p| (p.levels(), p))
        .filter(|(levels, _)| levels.is_low())
        .map(|(levels, p)| (ratio_key(&levels), p))
        .collect();
    low.sort_by(|a, b| a.0.total_cmp(&b.0));
    low.into_iter()
        .take(limit)
        .map(|(_, p)| LowStockEntry::from(p))
        .collect()
}

fn ratio_key(levels: &StockLevels) -> f64 {
    if levels.threshold > 0 {
        levels.fill_ratio()
    } else {
        0.0
    }
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeStats {
    pub active: usize,
    pub total: usize,
    pub percentage: f64,
}

pub fn employee_stats(employees: &[Employee]) -> EmployeeStats {
    let total = employees.len();
    let active = employees
        .iter()
        .filter(|e| e.status == EmployeeStatus::Active)
        .count();
    let percentage = if total > 0 {
        round1(active as f64 / total as f64 * 100.0)
    } else {
        0.0
    };
    EmployeeStats {
        active,
        total,
        percentage,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    /// `%a`, e.g. `Mon`.
    pub label: String,
    pub amount: Money,
}

/// Daily sale totals for the `days` days ending today, oldest first.
/// Days without sales are present with a zero amount.
pub fn daily_trend(sales: &[Sale], now: DateTime<Utc>, days: u32) -> Vec<TrendPoint> {
    let mut totals: HashMap<NaiveDate, Money> = HashMap::new();
    for sale in sales {
        *totals.entry(sale.sales_date.date_naive()).or_default() += sale.total_amount;
    }

    let today = now.date_naive();
    (0..days as i64)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            TrendPoint {
                date,
                label: date.format("%a").to_string(),
                amount: totals.get(&date).copied().unwrap_or_default(),
            }
        })
        .collect()
}

/// First day of the dashboard trend window.
pub fn trend_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    midnight(now.date_naive() - Duration::days(days.saturating_sub(1) as i64))
}

// =============================================================================
// Report Metadata
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMetadata {
    /// `AB{mm}{yy}-01`
    pub report_id: String,
    /// `INV-{day of year}`
    pub reference: String,
    /// `%d %B, %Y`
    pub date: String,
}

impl ReportMetadata {
    pub fn for_date(now: DateTime<Utc>) -> Self {
        ReportMetadata {
            report_id: format!("AB{}-01", now.format("%m%y")),
            reference: format!("INV-{}", now.format("%j")),
            date: now.format("%d %B, %Y").to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
