//! Recording sales and refunds.
//!
//! A sale is written in one transaction together with everything that
//! depends on it: the coupon redemption, the seller notification and the
//! queued receipt. The coupon row is locked for the length of that
//! transaction, so two concurrent sales cannot both take a coupon's last
//! redemption.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;

use shelfkeeper_core::coupon::{CouponCodeError, CouponRejection, RedemptionContext, normalize_code};
use shelfkeeper_core::sale::{SaleAmounts, SaleTarget, SaleTargetError};
use shelfkeeper_core::{
    CurrencyCode, CustomerId, MembershipId, Money, NotificationKind, PaymentMethodId, ProductId,
    ProductStatus, SaleId, SaleStatus, SellerId,
};

use crate::db::notifications::NewNotification;
use crate::db::sales::NewSale;
use crate::db::{
    RepositoryError, communications, coupons, customers, memberships, notifications,
    payment_methods, payment_settings, products, sales,
};
use crate::models::{Communication, CouponRedemption, Customer, CurrentSeller, Sale};
use crate::services::communications::{CommunicationService, receipt};
use crate::services::email::EmailService;
use crate::services::stats::StatsCache;

/// Errors recording a sale or refund.
#[derive(Debug, Error)]
pub enum SaleError {
    #[error("customer not found")]
    CustomerNotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("membership not found")]
    MembershipNotFound,

    #[error("{0}")]
    InvalidTarget(#[from] SaleTargetError),

    #[error("product is not published")]
    ProductUnavailable,

    #[error("membership is not active")]
    MembershipInactive,

    #[error("coupon not found")]
    CouponNotFound,

    #[error("invalid coupon code: {0}")]
    InvalidCouponCode(#[from] CouponCodeError),

    #[error("{0}")]
    CouponRejected(#[from] CouponRejection),

    #[error("payment method not found")]
    PaymentMethodNotFound,

    #[error("sale cannot be refunded: {0}")]
    NotRefundable(String),

    #[error("sale not found")]
    SaleNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A sale as requested by the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleRequest {
    pub customer_id: CustomerId,
    pub product_id: Option<ProductId>,
    pub membership_id: Option<MembershipId>,
    pub coupon_code: Option<String>,
    /// Defaults to the customer's default payment method.
    pub payment_method_id: Option<PaymentMethodId>,
}

impl SaleRequest {
    /// The single thing being bought.
    ///
    /// # Errors
    ///
    /// Returns `SaleError::InvalidTarget` unless exactly one of
    /// `product_id` and `membership_id` is set.
    pub fn target(&self) -> Result<SaleTarget, SaleError> {
        Ok(SaleTarget::from_columns(self.product_id, self.membership_id)?)
    }
}

/// A recorded sale and, when a coupon was used, its redemption.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedSale {
    pub sale: Sale,
    pub redemption: Option<CouponRedemption>,
}

/// The name and list price of a sale target.
#[derive(Debug, Clone)]
pub(crate) struct PricedTarget {
    pub name: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
}

/// Look up a target for this seller and check it can be sold.
pub(crate) async fn price_target(
    conn: &mut PgConnection,
    seller_id: SellerId,
    target: SaleTarget,
) -> Result<PricedTarget, SaleError> {
    match target {
        SaleTarget::Product(id) => {
            let product = products::get(conn, seller_id, id)
                .await
                .map_err(|e| not_found(e, SaleError::ProductNotFound))?;
            if product.status != ProductStatus::Published {
                return Err(SaleError::ProductUnavailable);
            }
            Ok(PricedTarget {
                name: product.name,
                price: product.price,
                currency: product.currency,
            })
        }
        SaleTarget::Membership(id) => {
            let membership = memberships::get(conn, seller_id, id)
                .await
                .map_err(|e| not_found(e, SaleError::MembershipNotFound))?;
            if !membership.is_active {
                return Err(SaleError::MembershipInactive);
            }
            Ok(PricedTarget {
                name: membership.name,
                price: membership.price,
                currency: membership.currency,
            })
        }
    }
}

/// Queue a receipt for `sale` if the seller sends receipts.
pub(crate) async fn queue_receipt(
    conn: &mut PgConnection,
    seller: &CurrentSeller,
    customer: &Customer,
    item_name: &str,
    sale: &Sale,
) -> Result<Option<Communication>, RepositoryError> {
    let settings = payment_settings::get(conn, seller.id).await?;
    if !settings.send_receipts {
        return Ok(None);
    }
    let message = receipt(customer, &seller.store_name, item_name, sale);
    communications::insert(conn, seller.id, &message).await.map(Some)
}

pub(crate) fn not_found<E: From<RepositoryError>>(err: RepositoryError, missing: E) -> E {
    match err {
        RepositoryError::NotFound => missing,
        other => other.into(),
    }
}

/// Sale service.
pub struct SaleService<'a> {
    pool: &'a PgPool,
    stats: &'a StatsCache,
    mailer: Option<&'a EmailService>,
}

impl<'a> SaleService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, stats: &'a StatsCache, mailer: Option<&'a EmailService>) -> Self {
        Self { pool, stats, mailer }
    }

    /// Record a completed sale.
    ///
    /// The customer, target, coupon and payment method must all belong to
    /// `seller`; anything else is reported as not found.
    ///
    /// # Errors
    ///
    /// Returns the `SaleError` describing the first check that failed.
    #[instrument(skip(self, seller, request), fields(seller_id = %seller.id))]
    pub async fn create(
        &self,
        seller: &CurrentSeller,
        request: &SaleRequest,
        now: DateTime<Utc>,
    ) -> Result<RecordedSale, SaleError> {
        let target = request.target()?;
        let coupon_code = request
            .coupon_code
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(normalize_code)
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let customer = customers::get(&mut tx, seller.id, request.customer_id, false)
            .await
            .map_err(|e| not_found(e, SaleError::CustomerNotFound))?;
        let priced = price_target(&mut tx, seller.id, target).await?;

        let coupon = match coupon_code {
            Some(code) => Some(
                coupons::get_by_code_for_update(&mut tx, seller.id, &code)
                    .await
                    .map_err(|e| not_found(e, SaleError::CouponNotFound))?,
            ),
            None => None,
        };

        let discount = match &coupon {
            Some(coupon) => {
                let customer_redemptions =
                    coupons::customer_redemption_count(&mut tx, seller.id, coupon.id, customer.id)
                        .await?;
                coupon.rules().evaluate(&RedemptionContext {
                    now,
                    target,
                    subtotal: priced.price,
                    times_redeemed: i64::from(coupon.times_redeemed),
                    customer_redemptions,
                })?
            }
            None => Decimal::ZERO,
        };

        let payment_method = match request.payment_method_id {
            Some(id) => Some(
                payment_methods::get_for_customer(&mut tx, seller.id, customer.id, id)
                    .await
                    .map_err(|e| not_found(e, SaleError::PaymentMethodNotFound))?,
            ),
            None => payment_methods::get_default(&mut tx, seller.id, customer.id).await?,
        };

        let sale = sales::insert(
            &mut tx,
            seller.id,
            &NewSale {
                customer_id: customer.id,
                target,
                subscription_id: None,
                coupon_id: coupon.as_ref().map(|c| c.id),
                payment_method_id: payment_method.as_ref().map(|pm| pm.id),
                amounts: SaleAmounts::new(priced.price, discount),
                currency: priced.currency,
                status: SaleStatus::Completed,
            },
        )
        .await?;

        let redemption = match &coupon {
            Some(coupon) => Some(
                coupons::record_redemption(
                    &mut tx,
                    seller.id,
                    coupon.id,
                    customer.id,
                    sale.id,
                    sale.amounts.discount,
                )
                .await?,
            ),
            None => None,
        };

        notifications::create(
            &mut tx,
            seller.id,
            &NewNotification {
                kind: NotificationKind::NewSale,
                title: format!("New sale: {}", priced.name),
                body: format!(
                    "{} bought {} for {}.",
                    customer.display_name(),
                    priced.name,
                    Money::new(sale.amounts.total, sale.currency)
                ),
                link: Some(format!("/api/sales/{}", sale.id)),
            },
        )
        .await?;

        let receipt = queue_receipt(&mut tx, seller, &customer, &priced.name, &sale).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        self.stats.invalidate(seller.id).await;

        tracing::info!(sale_id = %sale.id, total = %sale.amounts.total, "Sale recorded");

        if let Some(message) = receipt {
            CommunicationService::new(self.pool, self.mailer)
                .deliver(&seller.store_name, message)
                .await;
        }

        Ok(RecordedSale { sale, redemption })
    }

    /// Refund a completed sale.
    ///
    /// # Errors
    ///
    /// Returns `SaleError::SaleNotFound`, or `SaleError::NotRefundable` if
    /// the sale is not completed.
    #[instrument(skip(self, reason))]
    pub async fn refund(
        &self,
        seller_id: SellerId,
        id: SaleId,
        reason: Option<&str>,
    ) -> Result<Sale, SaleError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let sale = sales::refund(&mut tx, seller_id, id, reason)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => SaleError::SaleNotFound,
                RepositoryError::Conflict(message) => SaleError::NotRefundable(message),
                other => other.into(),
            })?;

        notifications::create(
            &mut tx,
            seller_id,
            &refund_notification(&sale, reason.unwrap_or("refunded by seller")),
        )
        .await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        self.stats.invalidate(seller_id).await;

        tracing::info!(sale_id = %sale.id, "Sale refunded");
        Ok(sale)
    }
}

/// The notification for a refunded sale.
pub(crate) fn refund_notification(sale: &Sale, reason: &str) -> NewNotification {
    NewNotification {
        kind: NotificationKind::SaleRefunded,
        title: "Sale refunded".to_string(),
        body: format!(
            "{} was refunded ({reason}).",
            Money::new(sale.amounts.total, sale.currency)
        ),
        link: Some(format!("/api/sales/{}", sale.id)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(product: Option<ProductId>, membership: Option<MembershipId>) -> SaleRequest {
        SaleRequest {
            customer_id: CustomerId::generate(),
            product_id: product,
            membership_id: membership,
            coupon_code: None,
            payment_method_id: None,
        }
    }

    #[test]
    fn test_request_needs_exactly_one_target() {
        let product = ProductId::generate();
        assert_eq!(
            request(Some(product), None).target().unwrap(),
            SaleTarget::Product(product)
        );
        assert!(matches!(
            request(None, None).target(),
            Err(SaleError::InvalidTarget(SaleTargetError::Missing))
        ));
        assert!(matches!(
            request(Some(product), Some(MembershipId::generate())).target(),
            Err(SaleError::InvalidTarget(SaleTargetError::Ambiguous))
        ));
    }

    #[test]
    fn test_not_found_maps_only_missing_rows() {
        assert!(matches!(
            not_found(RepositoryError::NotFound, SaleError::CouponNotFound),
            SaleError::CouponNotFound
        ));
        assert!(matches!(
            not_found(
                RepositoryError::Conflict("x".into()),
                SaleError::CouponNotFound
            ),
            SaleError::Repository(RepositoryError::Conflict(_))
        ));
    }

    #[test]
    fn test_request_deserializes_from_json() {
        let json = serde_json::json!({
            "customer_id": CustomerId::generate(),
            "product_id": ProductId::generate(),
            "coupon_code": "spring25",
        });
        let request: SaleRequest = serde_json::from_value(json).unwrap();
        assert!(request.membership_id.is_none());
        assert_eq!(request.coupon_code.as_deref(), Some("spring25"));
    }
}
