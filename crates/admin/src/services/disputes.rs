//! Chargeback disputes.
//!
//! A lost dispute refunds the sale it was raised against, in the same
//! transaction as the status change.

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use shelfkeeper_core::{DisputeId, DisputeStatus, Money, NotificationKind, SaleId, SaleStatus, SellerId};

use crate::db::notifications::NewNotification;
use crate::db::{DisputeRepository, RepositoryError, disputes, notifications, sales};
use crate::models::{Dispute, Sale};
use crate::services::sales::{not_found, refund_notification};
use crate::services::stats::StatsCache;

/// Errors handling disputes.
#[derive(Debug, Error)]
pub enum DisputeError {
    #[error("sale not found")]
    SaleNotFound,

    #[error("dispute not found")]
    DisputeNotFound,

    #[error("only completed sales can be disputed (sale is {0})")]
    SaleNotDisputable(SaleStatus),

    #[error("disputed amount must be greater than zero and at most the sale total of {0}")]
    InvalidAmount(Money),

    #[error("reason must not be blank")]
    MissingReason,

    #[error("evidence must not be blank")]
    MissingEvidence,

    #[error("cannot move a dispute from {from} to {to}")]
    InvalidTransition { from: DisputeStatus, to: DisputeStatus },

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Request to open a dispute.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenDispute {
    pub sale_id: SaleId,
    pub reason: String,
    /// Defaults to the sale total.
    pub amount: Option<Decimal>,
}

/// Dispute service.
pub struct DisputeService<'a> {
    pool: &'a PgPool,
    stats: &'a StatsCache,
}

impl<'a> DisputeService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, stats: &'a StatsCache) -> Self {
        Self { pool, stats }
    }

    /// Open a dispute against a completed sale.
    ///
    /// # Errors
    ///
    /// Returns `DisputeError::SaleNotFound`, `SaleNotDisputable`,
    /// `InvalidAmount`, or `Conflict` if the sale already has an unresolved
    /// dispute.
    #[instrument(skip(self, request), fields(sale_id = %request.sale_id))]
    pub async fn open(
        &self,
        seller_id: SellerId,
        request: &OpenDispute,
    ) -> Result<Dispute, DisputeError> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(DisputeError::MissingReason);
        }

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let sale = sales::get(&mut tx, seller_id, request.sale_id, true)
            .await
            .map_err(|e| not_found(e, DisputeError::SaleNotFound))?;
        let amount = disputed_amount(&sale, request.amount)?;

        let dispute = disputes::open(&mut tx, seller_id, sale.id, reason, amount)
            .await
            .map_err(conflict)?;

        notifications::create(
            &mut tx,
            seller_id,
            &NewNotification {
                kind: NotificationKind::DisputeOpened,
                title: "Dispute opened".to_string(),
                body: format!(
                    "A dispute for {} was opened: {reason}",
                    Money::new(amount, sale.currency)
                ),
                link: Some(format!("/api/disputes/{}", dispute.id)),
            },
        )
        .await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        self.stats.invalidate(seller_id).await;

        tracing::info!(dispute_id = %dispute.id, "Dispute opened");
        Ok(dispute)
    }

    /// Move a dispute to a new status. Losing refunds the sale.
    ///
    /// # Errors
    ///
    /// Returns `DisputeError::DisputeNotFound` or `InvalidTransition`.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        seller_id: SellerId,
        id: DisputeId,
        next: DisputeStatus,
    ) -> Result<Dispute, DisputeError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let current = disputes::get(&mut tx, seller_id, id, true)
            .await
            .map_err(|e| not_found(e, DisputeError::DisputeNotFound))?;
        if !current.status.can_transition_to(next) {
            return Err(DisputeError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let dispute = disputes::update_status(&mut tx, seller_id, id, next).await?;

        if next == DisputeStatus::Lost
            && let Some(refunded) = sales::mark_disputed_refund(&mut tx, seller_id, dispute.sale_id).await?
        {
            notifications::create(&mut tx, seller_id, &refund_notification(&refunded, "dispute lost"))
                .await?;
        }
        if next.is_terminal() {
            notifications::create(&mut tx, seller_id, &resolved_notification(&dispute)).await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        self.stats.invalidate(seller_id).await;

        tracing::info!(dispute_id = %dispute.id, from = %current.status, to = %next, "Dispute status changed");
        Ok(dispute)
    }

    /// Append evidence to an unresolved dispute.
    ///
    /// # Errors
    ///
    /// Returns `DisputeError::DisputeNotFound`, `MissingEvidence`, or
    /// `Conflict` once the dispute is resolved.
    pub async fn add_evidence(
        &self,
        seller_id: SellerId,
        id: DisputeId,
        note: &str,
    ) -> Result<Dispute, DisputeError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(DisputeError::MissingEvidence);
        }
        DisputeRepository::new(self.pool)
            .add_evidence(seller_id, id, note)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => DisputeError::DisputeNotFound,
                other => conflict(other),
            })
    }
}

/// The amount under dispute: the requested amount, or the whole sale.
fn disputed_amount(sale: &Sale, requested: Option<Decimal>) -> Result<Decimal, DisputeError> {
    if sale.status != SaleStatus::Completed {
        return Err(DisputeError::SaleNotDisputable(sale.status));
    }
    let total = sale.amounts.total;
    let amount = requested.unwrap_or(total);
    if amount <= Decimal::ZERO || amount > total {
        return Err(DisputeError::InvalidAmount(Money::new(total, sale.currency)));
    }
    Ok(amount)
}

fn resolved_notification(dispute: &Dispute) -> NewNotification {
    NewNotification {
        kind: NotificationKind::DisputeResolved,
        title: format!("Dispute {}", dispute.status),
        body: match dispute.status {
            DisputeStatus::Won => "The dispute was decided in your favour.".to_string(),
            DisputeStatus::Lost => "The dispute was lost and the sale has been refunded.".to_string(),
            _ => "The dispute was closed.".to_string(),
        },
        link: Some(format!("/api/disputes/{}", dispute.id)),
    }
}

fn conflict(err: RepositoryError) -> DisputeError {
    match err {
        RepositoryError::Conflict(message) => DisputeError::Conflict(message),
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use shelfkeeper_core::sale::{SaleAmounts, SaleTarget};
    use shelfkeeper_core::{CurrencyCode, CustomerId, ProductId};

    use super::*;

    fn sale(status: SaleStatus) -> Sale {
        Sale {
            id: SaleId::generate(),
            seller_id: SellerId::generate(),
            customer_id: CustomerId::generate(),
            target: SaleTarget::Product(ProductId::generate()),
            subscription_id: None,
            coupon_id: None,
            payment_method_id: None,
            amounts: SaleAmounts::undiscounted(Decimal::new(4000, 2)),
            currency: CurrencyCode::USD,
            status,
            refund_reason: None,
            refunded_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_disputed_amount_defaults_to_total() {
        let sale = sale(SaleStatus::Completed);
        assert_eq!(disputed_amount(&sale, None).unwrap(), Decimal::new(4000, 2));
        assert_eq!(
            disputed_amount(&sale, Some(Decimal::new(1000, 2))).unwrap(),
            Decimal::new(1000, 2)
        );
    }

    #[test]
    fn test_disputed_amount_bounds() {
        let sale = sale(SaleStatus::Completed);
        assert!(matches!(
            disputed_amount(&sale, Some(Decimal::ZERO)),
            Err(DisputeError::InvalidAmount(_))
        ));
        assert!(matches!(
            disputed_amount(&sale, Some(Decimal::new(4001, 2))),
            Err(DisputeError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_only_completed_sales_are_disputable() {
        assert!(matches!(
            disputed_amount(&sale(SaleStatus::Refunded), None),
            Err(DisputeError::SaleNotDisputable(SaleStatus::Refunded))
        ));
        assert!(matches!(
            disputed_amount(&sale(SaleStatus::Pending), None),
            Err(DisputeError::SaleNotDisputable(SaleStatus::Pending))
        ));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = DisputeError::InvalidTransition {
            from: DisputeStatus::Won,
            to: DisputeStatus::Open,
        };
        assert_eq!(err.to_string(), "cannot move a dispute from won to open");
    }
}
