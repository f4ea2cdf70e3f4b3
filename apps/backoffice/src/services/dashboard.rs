//! Dashboard metrics: today against yesterday, staff, low stock, recent
//! sales and the week's trend.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

use retail_core::report::{
    daily_trend, day_over_day, day_window, employee_stats, low_stock_by_ratio, total_amount,
    trend_start, Comparison, EmployeeStats, LowStockEntry, TrendPoint,
};
use retail_core::types::{PaymentMethod, Sale};
use retail_core::Money;

use crate::error::ApiResult;
use crate::state::AppState;

pub const LOW_STOCK_LIMIT: usize = 3;
pub const RECENT_TRANSACTIONS: u32 = 6;
pub const TREND_DAYS: u32 = 7;

#[derive(Debug, Serialize)]
pub struct RecentTransaction {
    pub sale_id: String,
    pub user_id: Option<String>,
    pub amount: Money,
    pub formatted_amount: String,
    pub payment_method: PaymentMethod,
    pub sales_date: DateTime<Utc>,
}

impl From<Sale> for RecentTransaction {
    fn from(sale: Sale) -> Self {
        RecentTransaction {
            formatted_amount: sale.total_amount.to_string(),
            sale_id: sale.sale_id,
            user_id: sale.user_id,
            amount: sale.total_amount,
            payment_method: sale.payment_method,
            sales_date: sale.sales_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub success: bool,
    pub sales: Comparison<Money>,
    pub items_sold: Comparison<i64>,
    pub employees: EmployeeStats,
    pub low_stock: Vec<LowStockEntry>,
    pub recent_transactions: Vec<RecentTransaction>,
    pub sales_trend: Vec<TrendPoint>,
}

pub struct DashboardService {
    state: AppState,
}

impl DashboardService {
    pub fn new(state: AppState) -> Self {
        DashboardService { state }
    }

    pub async fn metrics(&self) -> ApiResult<DashboardMetrics> {
        self.metrics_at(Utc::now()).await
    }

    pub async fn metrics_at(&self, now: DateTime<Utc>) -> ApiResult<DashboardMetrics> {
        let backend = &self.state.backend;
        let today = day_window(now.date_naive());
        let yesterday = day_window(now.date_naive() - Duration::days(1));

        // The trend window always covers yesterday.
        let sales = backend
            .sales()
            .completed_between(trend_start(now, TREND_DAYS), today.end)
            .await?;

        let today_sales: Vec<&Sale> = sales.iter().filter(|s| today.contains(s.sales_date)).collect();
        let yesterday_sales: Vec<&Sale> =
            sales.iter().filter(|s| yesterday.contains(s.sales_date)).collect();

        let day_ids: Vec<i64> = today_sales
            .iter()
            .chain(yesterday_sales.iter())
            .map(|s| s.id)
            .collect();
        let items = backend.sales().items_for_sales(&day_ids).await?;
        let today_ids: HashSet<i64> = today_sales.iter().map(|s| s.id).collect();
        let (items_today, items_yesterday) =
            items.iter().fold((0i64, 0i64), |(t, y), item| {
                if today_ids.contains(&item.sale_id) {
                    (t + item.quantity, y)
                } else {
                    (t, y + item.quantity)
                }
            });

        let employees = backend.employees().list(None, None).await?;
        let products = backend.products().list(None, None).await?;
        let recent = backend.sales().list_recent(RECENT_TRANSACTIONS).await?;

        Ok(DashboardMetrics {
            success: true,
            sales: day_over_day(
                total_amount(today_sales.iter().copied()),
                total_amount(yesterday_sales.iter().copied()),
                |m: Money| m.as_decimal(),
            ),
            items_sold: day_over_day(items_today, items_yesterday, |n: i64| n as f64),
            employees: employee_stats(&employees),
            low_stock: low_stock_by_ratio(&products, LOW_STOCK_LIMIT),
            recent_transactions: recent.into_iter().map(RecentTransaction::from).collect(),
            sales_trend: daily_trend(&sales, now, TREND_DAYS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{memory_state, product};
    use retail_core::types::{NewSale, NewSaleItem, SaleStatus};
    use retail_mail::RecordingMailer;

    async fn sale_at(
        memory: &crate::state::MemoryState,
        at: DateTime<Utc>,
        cents: i64,
        quantity: i64,
        status: SaleStatus,
    ) {
        let repo = memory.state.backend.sales();
        let sale = repo
            .create(&NewSale {
                user_id: "#abc".into(),
                sales_date: at,
                total_amount: Money::from_cents(cents),
                payment_method: PaymentMethod::Cash,
                status,
            })
            .await
            .unwrap();
        repo.insert_item(&NewSaleItem {
            sale_id: sale.id,
            product_id: None,
            quantity,
            unit_price: Money::from_cents(cents / quantity),
            subtotal: Money::from_cents(cents),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_metrics_compare_days() {
        let memory = memory_state(&RecordingMailer::new());
        let now = Utc::now();
        let yesterday = now - Duration::days(1);

        sale_at(&memory, now, 15_000, 3, SaleStatus::Completed).await;
        sale_at(&memory, yesterday, 10_000, 2, SaleStatus::Completed).await;
        sale_at(&memory, now, 99_900, 1, SaleStatus::Cancelled).await;

        product(&memory, "Green Tea", "Beverages", 350, 2).await;
        product(&memory, "Soy Milk", "Beverages", 280, 8).await;
        product(&memory, "Glue Stick", "Stationery", 200, 0).await;
        product(&memory, "Ballpoint Pen", "Stationery", 120, 30).await;

        let metrics = DashboardService::new(memory.state.clone())
            .metrics_at(now)
            .await
            .unwrap();

        assert_eq!(metrics.sales.today, Money::from_cents(15_000));
        assert_eq!(metrics.sales.yesterday, Money::from_cents(10_000));
        assert_eq!(metrics.sales.percentage, 50.0);
        assert!(metrics.sales.is_positive);

        assert_eq!(metrics.items_sold.today, 3);
        assert_eq!(metrics.items_sold.yesterday, 2);

        let low: Vec<&str> = metrics.low_stock.iter().map(|e| e.product_name.as_str()).collect();
        assert_eq!(low, vec!["Glue Stick", "Green Tea", "Soy Milk"]);

        assert_eq!(metrics.recent_transactions.len(), 3);
        assert_eq!(metrics.sales_trend.len(), 7);
        assert_eq!(metrics.sales_trend[6].amount, Money::from_cents(15_000));
        assert_eq!(metrics.sales_trend[5].amount, Money::from_cents(10_000));
        assert_eq!(metrics.sales_trend[0].amount, Money::zero());
    }

    #[tokio::test]
    async fn test_empty_dashboard() {
        let memory = memory_state(&RecordingMailer::new());
        let metrics = DashboardService::new(memory.state.clone())
            .metrics()
            .await
            .unwrap();

        assert_eq!(metrics.sales.percentage, 0.0);
        assert!(metrics.sales.is_positive);
        assert_eq!(metrics.employees.percentage, 0.0);
        assert!(metrics.low_stock.is_empty());
        assert!(metrics.sales_trend.iter().all(|p| p.amount.is_zero()));
    }
}
