//! Dashboard page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{Router, extract::State, routing::get};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::instrument;

use shelfkeeper_core::stats::DashboardStats;
use shelfkeeper_core::{CurrencyCode, Money};

use crate::db::PaymentSettingsRepository;
use crate::error::AppError;
use crate::middleware::RequireSeller;
use crate::models::CurrentSeller;
use crate::state::AppState;

/// One bar of the revenue chart.
#[derive(Debug, Clone)]
pub struct RevenueBarView {
    pub date: String,
    pub revenue: String,
    /// Bar height as a percentage of the busiest day.
    pub height: u32,
}

/// One row of the top products table.
#[derive(Debug, Clone)]
pub struct TopProductView {
    pub name: String,
    pub sales: i64,
    pub revenue: String,
}

/// Headline numbers, preformatted.
#[derive(Debug, Clone)]
pub struct MetricsView {
    pub net_revenue: String,
    pub gross_revenue: String,
    pub refunded: String,
    pub mrr: String,
    pub sales_count: i64,
    pub customers: i64,
    pub active_subscriptions: i64,
    pub open_disputes: i64,
    pub unread_notifications: i64,
}

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard/index.html")]
pub struct DashboardTemplate {
    pub seller: CurrentSeller,
    pub current_path: String,
    pub metrics: MetricsView,
    pub revenue_bars: Vec<RevenueBarView>,
    pub top_products: Vec<TopProductView>,
}

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(dashboard))
}

fn money(amount: Decimal, currency: CurrencyCode) -> String {
    Money::new(amount, currency).display()
}

impl MetricsView {
    fn new(stats: &DashboardStats, currency: CurrencyCode) -> Self {
        Self {
            net_revenue: money(stats.net_revenue, currency),
            gross_revenue: money(stats.gross_revenue, currency),
            refunded: money(stats.refunded, currency),
            mrr: money(stats.mrr, currency),
            sales_count: stats.sales_count,
            customers: stats.customers,
            active_subscriptions: stats.active_subscriptions,
            open_disputes: stats.open_disputes,
            unread_notifications: stats.unread_notifications,
        }
    }
}

fn revenue_bars(stats: &DashboardStats, currency: CurrencyCode) -> Vec<RevenueBarView> {
    let peak = stats
        .daily_revenue
        .iter()
        .map(|d| d.revenue)
        .max()
        .unwrap_or_default();
    stats
        .daily_revenue
        .iter()
        .map(|day| {
            let height = if peak.is_zero() {
                0
            } else {
                (day.revenue * Decimal::ONE_HUNDRED / peak)
                    .round()
                    .to_u32()
                    .unwrap_or(0)
            };
            RevenueBarView {
                date: day.date.format("%b %-d").to_string(),
                revenue: money(day.revenue, currency),
                height,
            }
        })
        .collect()
}

/// Dashboard page handler.
///
/// GET /
#[instrument(skip(seller, state), fields(seller_id = %seller.id))]
async fn dashboard(
    RequireSeller(seller): RequireSeller,
    State(state): State<AppState>,
) -> Result<DashboardTemplate, AppError> {
    let payment_settings = PaymentSettingsRepository::new(state.pool());
    let (stats, settings) = tokio::try_join!(
        state.stats().dashboard(state.pool(), seller.id, Utc::now()),
        payment_settings.get(seller.id),
    )?;
    let currency = settings.currency;

    Ok(DashboardTemplate {
        metrics: MetricsView::new(&stats, currency),
        revenue_bars: revenue_bars(&stats, currency),
        top_products: stats
            .top_products
            .iter()
            .map(|p| TopProductView {
                name: p.name.clone(),
                sales: p.sales,
                revenue: money(p.revenue, currency),
            })
            .collect(),
        seller,
        current_path: "/".to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use shelfkeeper_core::stats::DailyRevenue;

    use super::*;

    #[test]
    fn test_revenue_bars_scale_to_peak() {
        let day = |d, cents| DailyRevenue {
            date: NaiveDate::from_ymd_opt(2025, 3, d).unwrap(),
            revenue: Decimal::new(cents, 2),
            sales: 1,
        };
        let stats = DashboardStats {
            daily_revenue: vec![day(1, 0), day(2, 5000), day(3, 2500)],
            ..DashboardStats::default()
        };
        let bars = revenue_bars(&stats, CurrencyCode::USD);
        assert_eq!(bars.iter().map(|b| b.height).collect::<Vec<_>>(), vec![0, 100, 50]);
        assert_eq!(bars.get(1).unwrap().date, "Mar 2");
        assert_eq!(bars.get(1).unwrap().revenue, "$50.00");
    }

    #[test]
    fn test_revenue_bars_empty_window() {
        let stats = DashboardStats {
            daily_revenue: Vec::new(),
            ..DashboardStats::default()
        };
        assert!(revenue_bars(&stats, CurrencyCode::USD).is_empty());
    }
}
