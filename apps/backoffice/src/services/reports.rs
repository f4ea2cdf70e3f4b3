//! # Sales Report
//!
//! One read of completed sales feeds every section of the report:
//!
//! ```text
//! completed sales (earliest window start .. now)
//!      │
//!      ├── join items + products ──► SaleLine[]
//!      │        ├── per month ──────────► revenue / cost / profit trend
//!      │        └── this vs last month ─► best products (10), categories (3)
//!      │
//!      └── sale totals ─────────────────► today / week / month
//!
//! products ──► low stock (3, fewest units first)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retail_core::report::{
    best_categories, best_products, current_and_previous_month, join_lines, low_stock_by_quantity,
    monthly_financials, total_amount, trailing_months, CategoryPerformance, LowStockEntry,
    MonthSummary, Period, ProductPerformance, ReportMetadata, SaleLine, TotalsPeriod,
};
use retail_core::{Money, COMPANY_NAME};

use crate::config::MAX_REPORT_MONTHS;
use crate::error::ApiResult;
use crate::state::AppState;

pub const BEST_PRODUCTS_LIMIT: usize = 10;
pub const BEST_CATEGORIES_LIMIT: usize = 3;
pub const LOW_STOCK_LIMIT: usize = 3;

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub months: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Total {
    pub amount: Money,
    pub formatted: String,
}

impl From<Money> for Total {
    fn from(amount: Money) -> Self {
        Total {
            formatted: amount.to_string(),
            amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Totals {
    pub today: Total,
    pub week: Total,
    pub month: Total,
}

#[derive(Debug, Serialize)]
pub struct SalesReport {
    pub success: bool,
    pub company: &'static str,
    pub metadata: ReportMetadata,
    pub months: u32,
    pub monthly: Vec<MonthSummary>,
    pub best_products: Vec<ProductPerformance>,
    pub best_categories: Vec<CategoryPerformance>,
    pub low_stock: Vec<LowStockEntry>,
    pub totals: Totals,
}

pub struct ReportService {
    state: AppState,
}

impl ReportService {
    pub fn new(state: AppState) -> Self {
        ReportService { state }
    }

    /// Requested months, clamped to the supported range; the configured
    /// default when absent.
    fn months(&self, query: &ReportQuery) -> u32 {
        query
            .months
            .unwrap_or(self.state.config.report.months)
            .clamp(1, MAX_REPORT_MONTHS)
    }

    pub async fn report(&self, query: ReportQuery) -> ApiResult<SalesReport> {
        self.report_at(query, Utc::now()).await
    }

    pub async fn report_at(&self, query: ReportQuery, now: DateTime<Utc>) -> ApiResult<SalesReport> {
        let months = self.months(&query);
        let windows = trailing_months(now, months);
        let (current, previous) = current_and_previous_month(now);
        let periods = [
            TotalsPeriod::Today.window(now),
            TotalsPeriod::Week.window(now),
            TotalsPeriod::Month.window(now),
        ];

        let start = windows
            .iter()
            .map(|w| w.period.start)
            .chain([previous.start, periods[1].start])
            .min()
            .unwrap_or(previous.start);
        let end = current.end;

        let backend = &self.state.backend;
        let sales = backend.sales().completed_between(start, end).await?;
        let ids: Vec<i64> = sales.iter().map(|s| s.id).collect();
        let items = backend.sales().items_for_sales(&ids).await?;
        let products = backend.products().list(None, None).await?;

        let lines = join_lines(&sales, &items, &products);
        let in_period = |period: Period| {
            lines
                .iter()
                .copied()
                .filter(|l| period.contains(l.sold_at))
                .collect::<Vec<SaleLine<'_>>>()
        };
        let current_lines = in_period(current);
        let previous_lines = in_period(previous);

        let total_in = |period: Period| -> Total {
            total_amount(sales.iter().filter(|s| period.contains(s.sales_date))).into()
        };

        tracing::debug!(
            months,
            sales = sales.len(),
            lines = lines.len(),
            "Report data loaded"
        );

        Ok(SalesReport {
            success: true,
            company: COMPANY_NAME,
            metadata: ReportMetadata::for_date(now),
            months,
            monthly: monthly_financials(&lines, &windows),
            best_products: best_products(&current_lines, &previous_lines, BEST_PRODUCTS_LIMIT),
            best_categories: best_categories(
                &current_lines,
                &previous_lines,
                BEST_CATEGORIES_LIMIT,
            ),
            low_stock: low_stock_by_quantity(&products, LOW_STOCK_LIMIT),
            totals: Totals {
                today: total_in(periods[0]),
                week: total_in(periods[1]),
                month: total_in(periods[2]),
            },
        })
    }
}
