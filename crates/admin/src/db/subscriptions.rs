//! Customer subscription repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::billing::{PAST_DUE_GRACE_DAYS, Schedule};
use shelfkeeper_core::{
    CurrencyCode, CustomerId, MembershipId, SellerId, SubscriptionId, SubscriptionStatus,
};

use super::{Page, RepositoryError};
use crate::models::Subscription;

const SUBSCRIPTION_COLUMNS: &str = "id, seller_id, customer_id, membership_id, status, price, \
                                    currency, billing_cycle, anchor_day, trial_ends_at, \
                                    current_period_start, current_period_end, \
                                    cancel_at_period_end, cancelled_at, created_at, updated_at";

/// Subscriptions the renewal sweep can act on at `$1`, oldest first, at most `$2`.
///
/// A past-due subscription still inside its `$3`-day grace period with no
/// unexpired default payment method is left out: the sweep would do nothing with it,
/// and enough of them would fill every batch.
fn due_for_renewal_sql() -> String {
    format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM desk.customer_subscriptions s
         WHERE s.status IN ('trialing', 'active', 'past_due')
           AND s.current_period_end <= $1
           AND NOT (
               s.status = 'past_due'
               AND NOT s.cancel_at_period_end
               AND s.current_period_end > $1 - make_interval(days => $3::int)
               AND NOT EXISTS (
                   SELECT 1 FROM desk.customer_payment_methods pm
                    WHERE pm.seller_id = s.seller_id
                      AND pm.customer_id = s.customer_id
                      AND pm.is_default
                      AND (pm.exp_month IS NULL OR pm.exp_year IS NULL
                           OR (pm.exp_year, pm.exp_month) >= (
                               EXTRACT(YEAR FROM $1 AT TIME ZONE 'UTC')::int,
                               EXTRACT(MONTH FROM $1 AT TIME ZONE 'UTC')::int))
               )
           )
         ORDER BY s.current_period_end
         LIMIT $2"
    )
}

/// Filters for listing subscriptions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    pub status: Option<SubscriptionStatus>,
    pub customer_id: Option<CustomerId>,
    pub membership_id: Option<MembershipId>,
}

/// Fields for inserting a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: CustomerId,
    pub membership_id: MembershipId,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub schedule: Schedule,
}

/// Repository for subscriptions.
pub struct SubscriptionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubscriptionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List subscriptions matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        filter: &SubscriptionFilter,
        page: Page,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM desk.customer_subscriptions
             WHERE seller_id = $1
               AND ($2::desk.subscription_status IS NULL OR status = $2)
               AND ($3::uuid IS NULL OR customer_id = $3)
               AND ($4::uuid IS NULL OR membership_id = $4)
             ORDER BY created_at DESC
             LIMIT $5 OFFSET $6"
        );
        let subscriptions = sqlx::query_as::<_, Subscription>(&sql)
            .bind(seller_id)
            .bind(filter.status)
            .bind(filter.customer_id)
            .bind(filter.membership_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        Ok(subscriptions)
    }

    /// Get a subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist for this seller.
    pub async fn get(
        &self,
        seller_id: SellerId,
        id: SubscriptionId,
    ) -> Result<Subscription, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id, id, false).await
    }

    /// Cancel a subscription, immediately or at the end of the current period.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound`, or `RepositoryError::Conflict` if
    /// the subscription is already cancelled or expired.
    pub async fn cancel(
        &self,
        seller_id: SellerId,
        id: SubscriptionId,
        at_period_end: bool,
    ) -> Result<Subscription, RepositoryError> {
        let sql = if at_period_end {
            format!(
                "UPDATE desk.customer_subscriptions
                 SET cancel_at_period_end = TRUE, updated_at = NOW()
                 WHERE seller_id = $1 AND id = $2
                   AND status IN ('trialing', 'active', 'past_due')
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            )
        } else {
            format!(
                "UPDATE desk.customer_subscriptions
                 SET status = 'cancelled', cancelled_at = NOW(), cancel_at_period_end = FALSE,
                     updated_at = NOW()
                 WHERE seller_id = $1 AND id = $2
                   AND status IN ('trialing', 'active', 'past_due')
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            )
        };
        let updated = sqlx::query_as::<_, Subscription>(&sql)
            .bind(seller_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        match updated {
            Some(subscription) => Ok(subscription),
            None => {
                // Distinguish "not yours" from "already finished".
                self.get(seller_id, id).await?;
                Err(RepositoryError::Conflict(
                    "subscription is already cancelled or expired".to_string(),
                ))
            }
        }
    }

    /// Undo a pending cancel-at-period-end while the period is still running.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound`, or `RepositoryError::Conflict` if
    /// there is nothing to resume.
    pub async fn resume(
        &self,
        seller_id: SellerId,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, RepositoryError> {
        let sql = format!(
            "UPDATE desk.customer_subscriptions
             SET cancel_at_period_end = FALSE, updated_at = NOW()
             WHERE seller_id = $1 AND id = $2
               AND cancel_at_period_end
               AND status IN ('trialing', 'active')
               AND current_period_end > $3
             RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Subscription>(&sql)
            .bind(seller_id)
            .bind(id)
            .bind(now)
            .fetch_optional(self.pool)
            .await?;

        match updated {
            Some(subscription) => Ok(subscription),
            None => {
                self.get(seller_id, id).await?;
                Err(RepositoryError::Conflict(
                    "subscription is not pending cancellation".to_string(),
                ))
            }
        }
    }

    /// Live or past-due subscriptions whose period has ended, oldest first.
    ///
    /// This is the one query that spans sellers: it feeds the renewal sweep,
    /// which then works on each row under that row's `seller_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn due_for_renewal(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        let due = sqlx::query_as::<_, Subscription>(&due_for_renewal_sql())
            .bind(now)
            .bind(limit)
            .bind(PAST_DUE_GRACE_DAYS)
            .fetch_all(self.pool)
            .await?;
        Ok(due)
    }

    /// Live subscriptions with their membership prices, for MRR.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_live(&self, seller_id: SellerId) -> Result<Vec<Subscription>, RepositoryError> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM desk.customer_subscriptions
             WHERE seller_id = $1 AND status IN ('trialing', 'active')"
        );
        let live = sqlx::query_as::<_, Subscription>(&sql)
            .bind(seller_id)
            .fetch_all(self.pool)
            .await?;
        Ok(live)
    }
}

/// Get a subscription on `conn`, optionally locking the row.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not exist for this seller.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: SubscriptionId,
    for_update: bool,
) -> Result<Subscription, RepositoryError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM desk.customer_subscriptions
         WHERE seller_id = $1 AND id = $2{lock}"
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(seller_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Insert a subscription inside the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the customer already has a live
/// subscription to this membership.
pub async fn insert(
    conn: &mut PgConnection,
    seller_id: SellerId,
    new: &NewSubscription,
) -> Result<Subscription, RepositoryError> {
    let schedule = &new.schedule;
    let sql = format!(
        "INSERT INTO desk.customer_subscriptions
            (seller_id, customer_id, membership_id, status, price, currency, billing_cycle,
             anchor_day, trial_ends_at, current_period_start, current_period_end)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING {SUBSCRIPTION_COLUMNS}"
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(seller_id)
        .bind(new.customer_id)
        .bind(new.membership_id)
        .bind(schedule.status)
        .bind(new.price)
        .bind(new.currency)
        .bind(schedule.cycle)
        .bind(i32::try_from(schedule.anchor_day).unwrap_or(1))
        .bind(schedule.trial_ends_at)
        .bind(schedule.current_period_start)
        .bind(schedule.current_period_end)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            RepositoryError::from_constraint(
                e,
                "customer already has a live subscription to this membership",
            )
        })
}

/// Store a new schedule (after a renewal).
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not exist for this seller.
pub async fn update_schedule(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: SubscriptionId,
    schedule: &Schedule,
) -> Result<Subscription, RepositoryError> {
    let sql = format!(
        "UPDATE desk.customer_subscriptions
         SET status = $3, current_period_start = $4, current_period_end = $5,
             updated_at = NOW()
         WHERE seller_id = $1 AND id = $2
         RETURNING {SUBSCRIPTION_COLUMNS}"
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(seller_id)
        .bind(id)
        .bind(schedule.status)
        .bind(schedule.current_period_start)
        .bind(schedule.current_period_end)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Set the status (past due, expired).
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if it does not exist for this seller.
pub async fn set_status(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: SubscriptionId,
    status: SubscriptionStatus,
) -> Result<Subscription, RepositoryError> {
    let sql = format!(
        "UPDATE desk.customer_subscriptions
         SET status = $3, updated_at = NOW()
         WHERE seller_id = $1 AND id = $2
         RETURNING {SUBSCRIPTION_COLUMNS}"
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(seller_id)
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// The customer's newest subscription to a membership, in any status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn latest_for(
    conn: &mut PgConnection,
    seller_id: SellerId,
    customer_id: CustomerId,
    membership_id: MembershipId,
) -> Result<Option<Subscription>, RepositoryError> {
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM desk.customer_subscriptions
         WHERE seller_id = $1 AND customer_id = $2 AND membership_id = $3
         ORDER BY created_at DESC
         LIMIT 1"
    );
    let subscription = sqlx::query_as::<_, Subscription>(&sql)
        .bind(seller_id)
        .bind(customer_id)
        .bind(membership_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_for_renewal_skips_parked_past_due() {
        let sql = due_for_renewal_sql();
        assert!(sql.contains("s.status IN ('trialing', 'active', 'past_due')"));
        // Past due and in grace with nothing to charge
        assert!(sql.contains("AND NOT ("));
        assert!(sql.contains("s.status = 'past_due'"));
        assert!(sql.contains("AND NOT s.cancel_at_period_end"));
        assert!(sql.contains("s.current_period_end > $1 - make_interval(days => $3::int)"));
        assert!(sql.contains("AND NOT EXISTS ("));
        assert!(sql.contains("pm.is_default"));
        // An expired default card does not count as something to charge
        assert!(sql.contains("(pm.exp_year, pm.exp_month) >= ("));
        assert!(sql.contains("LIMIT $2"));
    }
}
