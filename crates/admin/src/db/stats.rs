//! Dashboard aggregate queries.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use shelfkeeper_core::stats::{DailyRevenue, TopProduct};
use shelfkeeper_core::{ProductId, SellerId};

use super::RepositoryError;

/// Headline counts and sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct Totals {
    /// Completed plus refunded sale totals.
    pub gross_revenue: Decimal,
    pub refunded: Decimal,
    pub sales_count: i64,
    pub customers: i64,
    pub active_subscriptions: i64,
    pub open_disputes: i64,
    pub unread_notifications: i64,
}

/// Repository for dashboard aggregates.
pub struct StatsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StatsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All-time totals for the seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn totals(&self, seller_id: SellerId) -> Result<Totals, RepositoryError> {
        let totals = sqlx::query_as::<_, Totals>(
            r"
            SELECT
                (SELECT COALESCE(SUM(total), 0) FROM desk.sales
                 WHERE seller_id = $1 AND status IN ('completed', 'refunded')) AS gross_revenue,
                (SELECT COALESCE(SUM(total), 0) FROM desk.sales
                 WHERE seller_id = $1 AND status = 'refunded') AS refunded,
                (SELECT COUNT(*) FROM desk.sales
                 WHERE seller_id = $1 AND status = 'completed') AS sales_count,
                (SELECT COUNT(*) FROM desk.customers WHERE seller_id = $1) AS customers,
                (SELECT COUNT(*) FROM desk.customer_subscriptions
                 WHERE seller_id = $1 AND status IN ('trialing', 'active')) AS active_subscriptions,
                (SELECT COUNT(*) FROM desk.disputes
                 WHERE seller_id = $1 AND status IN ('open', 'under_review')) AS open_disputes,
                (SELECT COUNT(*) FROM desk.notifications
                 WHERE seller_id = $1 AND read_at IS NULL) AS unread_notifications
            ",
        )
        .bind(seller_id)
        .fetch_one(self.pool)
        .await?;
        Ok(totals)
    }

    /// Completed-sale revenue per UTC day in `from..=to`. Days without sales
    /// are absent; see [`shelfkeeper_core::stats::fill_daily_series`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue_by_day(
        &self,
        seller_id: SellerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let rows: Vec<(NaiveDate, Decimal, i64)> = sqlx::query_as(
            r"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
                   SUM(total) AS revenue,
                   COUNT(*) AS sales
            FROM desk.sales
            WHERE seller_id = $1
              AND status = 'completed'
              AND (created_at AT TIME ZONE 'UTC')::date BETWEEN $2 AND $3
            GROUP BY day
            ORDER BY day
            ",
        )
        .bind(seller_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(date, revenue, sales)| DailyRevenue {
                date,
                revenue,
                sales,
            })
            .collect())
    }

    /// Products with the most completed-sale revenue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_products(
        &self,
        seller_id: SellerId,
        limit: i64,
    ) -> Result<Vec<TopProduct>, RepositoryError> {
        let rows: Vec<(ProductId, String, i64, Decimal)> = sqlx::query_as(
            r"
            SELECT p.id, p.name, COUNT(s.id) AS sales, SUM(s.total) AS revenue
            FROM desk.sales s
            JOIN desk.products p ON p.id = s.product_id AND p.seller_id = s.seller_id
            WHERE s.seller_id = $1 AND s.status = 'completed'
            GROUP BY p.id, p.name
            ORDER BY revenue DESC, sales DESC, p.name
            LIMIT $2
            ",
        )
        .bind(seller_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, name, sales, revenue)| TopProduct {
                product_id,
                name,
                sales,
                revenue,
            })
            .collect())
    }
}
