//! Subscription lifecycle and the renewal sweep.
//!
//! There is no scheduler inside the server. `renew_due` is called by
//! `sk-cli subscriptions renew-due` (from cron or by hand); each due
//! subscription is handled in its own transaction so one failure does not
//! hold back the rest.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;

use shelfkeeper_core::billing::{RenewalOutcome, Schedule, renewal_outcome};
use shelfkeeper_core::payment_method::is_expired;
use shelfkeeper_core::sale::{SaleAmounts, SaleTarget};
use shelfkeeper_core::{
    CustomerId, MembershipId, NotificationKind, PaymentMethodId, SaleStatus, SellerId,
    SubscriptionId, SubscriptionStatus,
};

use crate::db::notifications::NewNotification;
use crate::db::sales::NewSale;
use crate::db::subscriptions::NewSubscription;
use crate::db::{
    RepositoryError, SellerRepository, SubscriptionRepository, customers, notifications,
    payment_methods, sales, subscriptions,
};
use crate::models::{Communication, CurrentSeller, Customer, PaymentMethod, Sale, Subscription};
use crate::services::communications::CommunicationService;
use crate::services::email::EmailService;
use crate::services::sales::{SaleError, not_found, price_target, queue_receipt};
use crate::services::stats::StatsCache;

/// Errors in the subscription lifecycle.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("customer not found")]
    CustomerNotFound,

    #[error("membership not found")]
    MembershipNotFound,

    #[error("membership is not active")]
    MembershipInactive,

    #[error("customer already has a live subscription to this membership")]
    AlreadySubscribed,

    #[error("payment method not found")]
    PaymentMethodNotFound,

    #[error("a payment method is required when there is no trial")]
    PaymentMethodRequired,

    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error("{0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<SaleError> for SubscriptionError {
    fn from(err: SaleError) -> Self {
        match err {
            SaleError::MembershipNotFound => Self::MembershipNotFound,
            SaleError::MembershipInactive => Self::MembershipInactive,
            SaleError::CustomerNotFound => Self::CustomerNotFound,
            SaleError::PaymentMethodNotFound => Self::PaymentMethodNotFound,
            SaleError::Repository(e) => Self::Repository(e),
            other => Self::InvalidState(other.to_string()),
        }
    }
}

/// Request to subscribe a customer to a membership.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub customer_id: CustomerId,
    pub membership_id: MembershipId,
    /// Defaults to the customer's default payment method.
    pub payment_method_id: Option<PaymentMethodId>,
}

/// A new subscription and the sale for its first period, if one was charged.
#[derive(Debug, Clone, Serialize)]
pub struct StartedSubscription {
    pub subscription: Subscription,
    pub first_sale: Option<Sale>,
}

/// Counts from one renewal sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    pub examined: usize,
    pub renewed: usize,
    pub past_due: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Subscription service.
pub struct SubscriptionService<'a> {
    pool: &'a PgPool,
    stats: &'a StatsCache,
    mailer: Option<&'a EmailService>,
}

impl<'a> SubscriptionService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, stats: &'a StatsCache, mailer: Option<&'a EmailService>) -> Self {
        Self { pool, stats, mailer }
    }

    /// Subscribe a customer to a membership.
    ///
    /// Without a trial the first period is charged immediately to the given
    /// (or default) payment method.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::AlreadySubscribed` if the customer has a
    /// live subscription to the membership, or the error for whichever
    /// ownership check failed.
    #[instrument(skip(self, seller, request), fields(seller_id = %seller.id))]
    pub async fn start(
        &self,
        seller: &CurrentSeller,
        request: &StartRequest,
        now: DateTime<Utc>,
    ) -> Result<StartedSubscription, SubscriptionError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        // Locking the customer serialises concurrent starts for them.
        let customer = customers::get(&mut tx, seller.id, request.customer_id, true)
            .await
            .map_err(|e| not_found(e, SubscriptionError::CustomerNotFound))?;
        let target = SaleTarget::Membership(request.membership_id);
        let priced = price_target(&mut tx, seller.id, target).await?;
        let membership =
            crate::db::memberships::get(&mut tx, seller.id, request.membership_id).await?;

        let trial_days = u32::try_from(membership.trial_days).unwrap_or(0);
        let schedule = Schedule::begin(now, membership.billing_cycle, trial_days);

        let payment_method = match request.payment_method_id {
            Some(id) => Some(
                payment_methods::get_for_customer(&mut tx, seller.id, customer.id, id)
                    .await
                    .map_err(|e| not_found(e, SubscriptionError::PaymentMethodNotFound))?,
            ),
            None => payment_methods::get_default(&mut tx, seller.id, customer.id).await?,
        };
        if schedule.status == SubscriptionStatus::Active && payment_method.is_none() {
            return Err(SubscriptionError::PaymentMethodRequired);
        }

        let subscription = subscriptions::insert(
            &mut tx,
            seller.id,
            &NewSubscription {
                customer_id: customer.id,
                membership_id: membership.id,
                price: priced.price,
                currency: priced.currency,
                schedule,
            },
        )
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => SubscriptionError::AlreadySubscribed,
            other => other.into(),
        })?;

        let (first_sale, receipt) = if schedule.status == SubscriptionStatus::Active {
            let (sale, receipt) = charge_period(
                &mut tx,
                seller,
                &customer,
                &subscription,
                &membership.name,
                payment_method.as_ref().map(|pm| pm.id),
            )
            .await?;
            (Some(sale), receipt)
        } else {
            (None, None)
        };

        notifications::create(
            &mut tx,
            seller.id,
            &NewNotification {
                kind: NotificationKind::SubscriptionStarted,
                title: format!("New subscriber: {}", membership.name),
                body: match subscription.trial_ends_at {
                    Some(trial_end) => format!(
                        "{} started a trial ending {}.",
                        customer.display_name(),
                        trial_end.format("%Y-%m-%d")
                    ),
                    None => format!("{} subscribed.", customer.display_name()),
                },
                link: Some(format!("/api/subscriptions/{}", subscription.id)),
            },
        )
        .await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        self.stats.invalidate(seller.id).await;
        self.deliver(&seller.store_name, receipt).await;

        tracing::info!(subscription_id = %subscription.id, status = %subscription.status, "Subscription started");
        Ok(StartedSubscription {
            subscription,
            first_sale,
        })
    }

    /// Cancel now, or at the end of the current period.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::SubscriptionNotFound`, or
    /// `SubscriptionError::InvalidState` if it already ended.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        seller_id: SellerId,
        id: SubscriptionId,
        at_period_end: bool,
    ) -> Result<Subscription, SubscriptionError> {
        let subscription = SubscriptionRepository::new(self.pool)
            .cancel(seller_id, id, at_period_end)
            .await
            .map_err(lifecycle_error)?;

        let body = if at_period_end {
            format!(
                "Subscription will end on {}.",
                subscription.current_period_end.format("%Y-%m-%d")
            )
        } else {
            "Subscription was cancelled immediately.".to_string()
        };
        crate::db::NotificationRepository::new(self.pool)
            .create(
                seller_id,
                &NewNotification {
                    kind: NotificationKind::SubscriptionCancelled,
                    title: "Subscription cancelled".to_string(),
                    body,
                    link: Some(format!("/api/subscriptions/{}", subscription.id)),
                },
            )
            .await?;

        self.stats.invalidate(seller_id).await;
        Ok(subscription)
    }

    /// Undo a pending cancel-at-period-end.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::SubscriptionNotFound`, or
    /// `SubscriptionError::InvalidState` if nothing is pending or the period
    /// has already ended.
    #[instrument(skip(self))]
    pub async fn resume(
        &self,
        seller_id: SellerId,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let subscription = SubscriptionRepository::new(self.pool)
            .resume(seller_id, id, now)
            .await
            .map_err(lifecycle_error)?;
        self.stats.invalidate(seller_id).await;
        Ok(subscription)
    }

    /// Process up to `limit` subscriptions whose period has ended.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` only if the due list cannot be read; errors
    /// on individual subscriptions are logged and counted as failed.
    #[instrument(skip(self))]
    pub async fn renew_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<RenewalReport, RepositoryError> {
        let due = SubscriptionRepository::new(self.pool)
            .due_for_renewal(now, limit)
            .await?;
        let sellers = SellerRepository::new(self.pool);
        let mut report = RenewalReport {
            examined: due.len(),
            ..RenewalReport::default()
        };

        for subscription in due {
            let seller = match sellers.get_by_id(subscription.seller_id).await {
                Ok(Some(seller)) => CurrentSeller::from(&seller),
                Ok(None) => {
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(subscription_id = %subscription.id, error = %e, "Failed to load seller");
                    report.failed += 1;
                    continue;
                }
            };

            match self.renew_one(&seller, subscription.id, now).await {
                Ok(RenewalOutcome::Renew) => report.renewed += 1,
                Ok(RenewalOutcome::MarkPastDue) => report.past_due += 1,
                Ok(RenewalOutcome::Expire) => report.expired += 1,
                Ok(RenewalOutcome::NotDue) => {}
                Err(e) => {
                    tracing::error!(subscription_id = %subscription.id, error = %e, "Renewal failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            renewed = report.renewed,
            past_due = report.past_due,
            expired = report.expired,
            failed = report.failed,
            "Renewal sweep finished"
        );
        Ok(report)
    }

    async fn renew_one(
        &self,
        seller: &CurrentSeller,
        id: SubscriptionId,
        now: DateTime<Utc>,
    ) -> Result<RenewalOutcome, SubscriptionError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let subscription = subscriptions::get(&mut tx, seller.id, id, true).await?;
        let payment_method = chargeable(
            payment_methods::get_default(&mut tx, seller.id, subscription.customer_id).await?,
            now.date_naive(),
        );
        let outcome = renewal_outcome(&subscription.renewal_input(payment_method.is_some()), now);

        let mut receipt = None;
        match outcome {
            RenewalOutcome::NotDue => return Ok(outcome),
            RenewalOutcome::Renew => {
                let renewed =
                    subscriptions::update_schedule(&mut tx, seller.id, id, &subscription.schedule().renew())
                        .await?;
                let customer =
                    customers::get(&mut tx, seller.id, subscription.customer_id, false).await?;
                let membership =
                    crate::db::memberships::get(&mut tx, seller.id, subscription.membership_id)
                        .await?;
                let (_, queued) = charge_period(
                    &mut tx,
                    seller,
                    &customer,
                    &renewed,
                    &membership.name,
                    payment_method.as_ref().map(|pm| pm.id),
                )
                .await?;
                receipt = queued;
            }
            RenewalOutcome::MarkPastDue => {
                subscriptions::set_status(&mut tx, seller.id, id, SubscriptionStatus::PastDue)
                    .await?;
                notifications::create(
                    &mut tx,
                    seller.id,
                    &NewNotification {
                        kind: NotificationKind::SubscriptionPastDue,
                        title: "Subscription past due".to_string(),
                        body: "Renewal failed: the customer has no usable default payment method."
                            .to_string(),
                        link: Some(format!("/api/subscriptions/{id}")),
                    },
                )
                .await?;
            }
            RenewalOutcome::Expire => {
                subscriptions::set_status(&mut tx, seller.id, id, SubscriptionStatus::Expired)
                    .await?;
                notifications::create(
                    &mut tx,
                    seller.id,
                    &NewNotification {
                        kind: NotificationKind::SubscriptionCancelled,
                        title: "Subscription expired".to_string(),
                        body: if subscription.cancel_at_period_end {
                            "The subscription reached the end of its final period.".to_string()
                        } else {
                            "The subscription stayed past due through the grace period.".to_string()
                        },
                        link: Some(format!("/api/subscriptions/{id}")),
                    },
                )
                .await?;
            }
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        self.stats.invalidate(seller.id).await;
        self.deliver(&seller.store_name, receipt).await;
        Ok(outcome)
    }

    async fn deliver(&self, store_name: &str, receipt: Option<Communication>) {
        if let Some(message) = receipt {
            CommunicationService::new(self.pool, self.mailer)
                .deliver(store_name, message)
                .await;
        }
    }
}

/// Record the completed sale for one period of `subscription`.
async fn charge_period(
    conn: &mut PgConnection,
    seller: &CurrentSeller,
    customer: &Customer,
    subscription: &Subscription,
    membership_name: &str,
    payment_method_id: Option<PaymentMethodId>,
) -> Result<(Sale, Option<Communication>), RepositoryError> {
    let sale = sales::insert(
        conn,
        seller.id,
        &NewSale {
            customer_id: customer.id,
            target: SaleTarget::Membership(subscription.membership_id),
            subscription_id: Some(subscription.id),
            coupon_id: None,
            payment_method_id,
            amounts: SaleAmounts::undiscounted(subscription.price),
            currency: subscription.currency,
            status: SaleStatus::Completed,
        },
    )
    .await?;
    let receipt = queue_receipt(conn, seller, customer, membership_name, &sale).await?;
    Ok((sale, receipt))
}

fn lifecycle_error(err: RepositoryError) -> SubscriptionError {
    match err {
        RepositoryError::NotFound => SubscriptionError::SubscriptionNotFound,
        RepositoryError::Conflict(message) => SubscriptionError::InvalidState(message),
        other => other.into(),
    }
}

/// The default method, unless its card expired before `today`.
fn chargeable(default: Option<PaymentMethod>, today: NaiveDate) -> Option<PaymentMethod> {
    default.filter(|pm| !is_expired(pm.exp_month, pm.exp_year, today))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use shelfkeeper_core::PaymentMethodKind;

    use super::*;

    fn card(exp_month: i32, exp_year: i32) -> PaymentMethod {
        PaymentMethod {
            id: PaymentMethodId::generate(),
            seller_id: SellerId::generate(),
            customer_id: CustomerId::generate(),
            kind: PaymentMethodKind::Card,
            label: "Visa ending 4242".to_string(),
            last4: Some("4242".to_string()),
            exp_month: Some(exp_month),
            exp_year: Some(exp_year),
            is_default: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_expired_default_is_not_chargeable() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert!(chargeable(Some(card(6, 2025)), today).is_some());
        assert!(chargeable(Some(card(5, 2025)), today).is_none());
        assert!(chargeable(None, today).is_none());

        // An expired card leaves a due renewal with nothing to charge
        let period_end = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let input = shelfkeeper_core::billing::RenewalInput {
            status: SubscriptionStatus::Active,
            current_period_end: period_end,
            cancel_at_period_end: false,
            has_payment_method: chargeable(Some(card(5, 2025)), today).is_some(),
        };
        assert_eq!(
            renewal_outcome(&input, Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap()),
            RenewalOutcome::MarkPastDue
        );
    }

    #[test]
    fn test_lifecycle_error_mapping() {
        assert!(matches!(
            lifecycle_error(RepositoryError::NotFound),
            SubscriptionError::SubscriptionNotFound
        ));
        assert!(matches!(
            lifecycle_error(RepositoryError::Conflict("already cancelled".into())),
            SubscriptionError::InvalidState(m) if m == "already cancelled"
        ));
    }

    #[test]
    fn test_sale_errors_translate() {
        assert!(matches!(
            SubscriptionError::from(SaleError::MembershipInactive),
            SubscriptionError::MembershipInactive
        ));
        assert!(matches!(
            SubscriptionError::from(SaleError::ProductUnavailable),
            SubscriptionError::InvalidState(_)
        ));
    }
}
