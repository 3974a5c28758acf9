//! Dashboard statistics with a short per-seller cache.
//!
//! The dashboard is polled far more often than sales happen, so each
//! seller's stats are kept for 60 seconds. Anything that changes revenue
//! (a sale, a refund, a lost dispute) invalidates the seller's entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

use shelfkeeper_core::billing::monthly_equivalent;
use shelfkeeper_core::{SellerId, SubscriptionStatus};
use shelfkeeper_core::stats::{DailyRevenue, DashboardStats, TopProduct, fill_daily_series};

use crate::db::stats::Totals;
use crate::db::{RepositoryError, StatsRepository, SubscriptionRepository};
use crate::models::Subscription;

/// How long a seller's stats are served from memory.
pub const STATS_TTL: Duration = Duration::from_secs(60);

/// Days shown in the revenue chart, today included.
pub const REVENUE_WINDOW_DAYS: u32 = 30;

/// Best sellers shown on the dashboard.
const TOP_PRODUCTS: i64 = 5;

/// Per-seller cache of [`DashboardStats`].
#[derive(Clone)]
pub struct StatsCache {
    cache: Cache<SellerId, Arc<DashboardStats>>,
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(STATS_TTL)
    }
}

impl StatsCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Stats for `seller_id`, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a query fails; failures are not cached.
    #[instrument(skip(self, pool))]
    pub async fn dashboard(
        &self,
        pool: &PgPool,
        seller_id: SellerId,
        now: DateTime<Utc>,
    ) -> Result<Arc<DashboardStats>, RepositoryError> {
        if let Some(stats) = self.cache.get(&seller_id).await {
            debug!("Dashboard stats cache hit");
            return Ok(stats);
        }

        let stats = Arc::new(compute(pool, seller_id, now).await?);
        self.cache.insert(seller_id, Arc::clone(&stats)).await;
        Ok(stats)
    }

    /// Drop the cached stats for `seller_id`.
    pub async fn invalidate(&self, seller_id: SellerId) {
        self.cache.invalidate(&seller_id).await;
    }
}

async fn compute(
    pool: &PgPool,
    seller_id: SellerId,
    now: DateTime<Utc>,
) -> Result<DashboardStats, RepositoryError> {
    let stats = StatsRepository::new(pool);
    let subscriptions = SubscriptionRepository::new(pool);

    let to = now.date_naive();
    let from = to - chrono::Days::new(u64::from(REVENUE_WINDOW_DAYS - 1));

    let (totals, daily, top, live) = tokio::try_join!(
        stats.totals(seller_id),
        stats.revenue_by_day(seller_id, from, to),
        stats.top_products(seller_id, TOP_PRODUCTS),
        subscriptions.list_live(seller_id),
    )?;

    Ok(assemble(
        &totals,
        mrr(&live),
        fill_daily_series(from, to, &daily),
        top,
    ))
}

/// Monthly recurring revenue of the given live subscriptions.
///
/// Only `active` subscriptions count: a trial has not been charged yet, so
/// it is not revenue until it converts.
fn mrr(live: &[Subscription]) -> Decimal {
    live.iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
        .map(|s| monthly_equivalent(s.price, s.billing_cycle))
        .sum()
}

fn assemble(
    totals: &Totals,
    mrr: Decimal,
    daily_revenue: Vec<DailyRevenue>,
    top_products: Vec<TopProduct>,
) -> DashboardStats {
    DashboardStats {
        gross_revenue: totals.gross_revenue,
        refunded: totals.refunded,
        net_revenue: totals.gross_revenue - totals.refunded,
        sales_count: totals.sales_count,
        customers: totals.customers,
        active_subscriptions: totals.active_subscriptions,
        mrr,
        open_disputes: totals.open_disputes,
        unread_notifications: totals.unread_notifications,
        daily_revenue,
        top_products,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use shelfkeeper_core::{BillingCycle, CurrencyCode, CustomerId, MembershipId, SubscriptionId};

    use super::*;

    fn subscription(price: Decimal, cycle: BillingCycle) -> Subscription {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Subscription {
            id: SubscriptionId::generate(),
            seller_id: SellerId::generate(),
            customer_id: CustomerId::generate(),
            membership_id: MembershipId::generate(),
            status: SubscriptionStatus::Active,
            price,
            currency: CurrencyCode::USD,
            billing_cycle: cycle,
            anchor_day: 1,
            trial_ends_at: None,
            current_period_start: at,
            current_period_end: at,
            cancel_at_period_end: false,
            cancelled_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_mrr_normalises_cycles() {
        let live = [
            subscription(Decimal::new(1000, 2), BillingCycle::Monthly),
            subscription(Decimal::new(12000, 2), BillingCycle::Yearly),
            subscription(Decimal::new(3000, 2), BillingCycle::Quarterly),
        ];
        // 10 + 10 + 10
        assert_eq!(mrr(&live), Decimal::new(3000, 2));
        assert_eq!(mrr(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_mrr_skips_trials() {
        let mut trial = subscription(Decimal::new(5000, 2), BillingCycle::Monthly);
        trial.status = SubscriptionStatus::Trialing;
        let live = [
            subscription(Decimal::new(1000, 2), BillingCycle::Monthly),
            trial,
        ];
        assert_eq!(mrr(&live), Decimal::new(1000, 2));
    }

    #[test]
    fn test_assemble_nets_refunds() {
        let totals = Totals {
            gross_revenue: Decimal::new(10_000, 2),
            refunded: Decimal::new(2_500, 2),
            sales_count: 4,
            customers: 3,
            active_subscriptions: 1,
            open_disputes: 1,
            unread_notifications: 2,
        };
        let stats = assemble(&totals, Decimal::new(999, 2), Vec::new(), Vec::new());
        assert_eq!(stats.net_revenue, Decimal::new(7_500, 2));
        assert_eq!(stats.mrr, Decimal::new(999, 2));
        assert_eq!(stats.open_disputes, 1);
    }

    #[tokio::test]
    async fn test_cache_serves_until_invalidated() {
        let cache = StatsCache::default();
        let seller = SellerId::generate();
        let stats = Arc::new(DashboardStats {
            sales_count: 7,
            ..DashboardStats::default()
        });
        cache.cache.insert(seller, Arc::clone(&stats)).await;
        assert_eq!(cache.cache.get(&seller).await.unwrap().sales_count, 7);

        cache.invalidate(seller).await;
        assert!(cache.cache.get(&seller).await.is_none());
    }
}
