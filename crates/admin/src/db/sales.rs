//! Sale repository.
//!
//! `desk.sales` stores the target as two nullable columns guarded by the
//! `sales_exactly_one_target` constraint. Rows are read into [`SaleRow`] and
//! converted, so a row that somehow violates the rule surfaces as
//! `DataCorruption` instead of a half-built `Sale`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::sale::{SaleAmounts, SaleTarget};
use shelfkeeper_core::{
    CouponId, CurrencyCode, CustomerId, MembershipId, PaymentMethodId, ProductId, SaleId,
    SaleStatus, SellerId, SubscriptionId,
};

use super::{Page, RepositoryError};
use crate::models::Sale;

const SALE_COLUMNS: &str = "id, seller_id, customer_id, product_id, membership_id, \
                            subscription_id, coupon_id, payment_method_id, subtotal, discount, \
                            total, currency, status, refund_reason, refunded_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: SaleId,
    seller_id: SellerId,
    customer_id: CustomerId,
    product_id: Option<ProductId>,
    membership_id: Option<MembershipId>,
    subscription_id: Option<SubscriptionId>,
    coupon_id: Option<CouponId>,
    payment_method_id: Option<PaymentMethodId>,
    subtotal: Decimal,
    discount: Decimal,
    total: Decimal,
    currency: CurrencyCode,
    status: SaleStatus,
    refund_reason: Option<String>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = RepositoryError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        let target = SaleTarget::from_columns(row.product_id, row.membership_id).map_err(|e| {
            RepositoryError::DataCorruption(format!("sale {}: {e}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            seller_id: row.seller_id,
            customer_id: row.customer_id,
            target,
            subscription_id: row.subscription_id,
            coupon_id: row.coupon_id,
            payment_method_id: row.payment_method_id,
            amounts: SaleAmounts {
                subtotal: row.subtotal,
                discount: row.discount,
                total: row.total,
            },
            currency: row.currency,
            status: row.status,
            refund_reason: row.refund_reason,
            refunded_at: row.refunded_at,
            created_at: row.created_at,
        })
    }
}

/// Filters for listing sales. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub customer_id: Option<CustomerId>,
    pub product_id: Option<ProductId>,
    pub membership_id: Option<MembershipId>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
}

/// Fields for inserting a sale.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub customer_id: CustomerId,
    pub target: SaleTarget,
    pub subscription_id: Option<SubscriptionId>,
    pub coupon_id: Option<CouponId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub amounts: SaleAmounts,
    pub currency: CurrencyCode,
    pub status: SaleStatus,
}

/// Repository for sales.
pub struct SaleRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SaleRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List sales matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` or `RepositoryError::DataCorruption`.
    pub async fn list(
        &self,
        seller_id: SellerId,
        filter: &SaleFilter,
        page: Page,
    ) -> Result<Vec<Sale>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM desk.sales
             WHERE seller_id = $1
               AND ($2::desk.sale_status IS NULL OR status = $2)
               AND ($3::uuid IS NULL OR customer_id = $3)
               AND ($4::uuid IS NULL OR product_id = $4)
               AND ($5::uuid IS NULL OR membership_id = $5)
               AND ($6::timestamptz IS NULL OR created_at >= $6)
               AND ($7::timestamptz IS NULL OR created_at < $7)
             ORDER BY created_at DESC
             LIMIT $8 OFFSET $9"
        );
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(seller_id)
            .bind(filter.status)
            .bind(filter.customer_id)
            .bind(filter.product_id)
            .bind(filter.membership_id)
            .bind(filter.from)
            .bind(filter.to)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get a sale.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the sale does not exist for this seller.
    pub async fn get(&self, seller_id: SellerId, id: SaleId) -> Result<Sale, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id, id, false).await
    }

    /// Refund a completed sale.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound`, or `RepositoryError::Conflict` if
    /// the sale is not completed.
    pub async fn refund(
        &self,
        seller_id: SellerId,
        id: SaleId,
        reason: Option<&str>,
    ) -> Result<Sale, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let sale = refund(&mut tx, seller_id, id, reason).await?;
        tx.commit().await?;
        Ok(sale)
    }
}

/// Get a sale on `conn`, optionally locking the row.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the sale does not exist for this seller.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: SaleId,
    for_update: bool,
) -> Result<Sale, RepositoryError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {SALE_COLUMNS} FROM desk.sales WHERE seller_id = $1 AND id = $2{lock}");
    sqlx::query_as::<_, SaleRow>(&sql)
        .bind(seller_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
}

/// Insert a sale inside the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if a constraint rejects the row.
pub async fn insert(
    conn: &mut PgConnection,
    seller_id: SellerId,
    new: &NewSale,
) -> Result<Sale, RepositoryError> {
    let sql = format!(
        "INSERT INTO desk.sales
            (seller_id, customer_id, product_id, membership_id, subscription_id, coupon_id,
             payment_method_id, subtotal, discount, total, currency, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING {SALE_COLUMNS}"
    );
    sqlx::query_as::<_, SaleRow>(&sql)
        .bind(seller_id)
        .bind(new.customer_id)
        .bind(new.target.product_id())
        .bind(new.target.membership_id())
        .bind(new.subscription_id)
        .bind(new.coupon_id)
        .bind(new.payment_method_id)
        .bind(new.amounts.subtotal)
        .bind(new.amounts.discount)
        .bind(new.amounts.total)
        .bind(new.currency)
        .bind(new.status)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "sale violates a constraint"))?
        .try_into()
}

/// Move a completed sale to refunded inside the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound`, or `RepositoryError::Conflict` if
/// the sale is not completed.
pub async fn refund(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: SaleId,
    reason: Option<&str>,
) -> Result<Sale, RepositoryError> {
    let current = get(conn, seller_id, id, true).await?;
    if current.status != SaleStatus::Completed {
        return Err(RepositoryError::Conflict(format!(
            "only completed sales can be refunded (sale is {})",
            current.status
        )));
    }

    let sql = format!(
        "UPDATE desk.sales
         SET status = 'refunded', refunded_at = NOW(), refund_reason = $3
         WHERE seller_id = $1 AND id = $2
         RETURNING {SALE_COLUMNS}"
    );
    sqlx::query_as::<_, SaleRow>(&sql)
        .bind(seller_id)
        .bind(id)
        .bind(reason)
        .fetch_one(&mut *conn)
        .await?
        .try_into()
}

/// Refund a sale because its dispute was lost.
///
/// Returns the refunded sale, or `None` if the seller had already refunded it.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound`, or `RepositoryError::Conflict` if
/// the sale is neither completed nor refunded.
pub async fn mark_disputed_refund(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: SaleId,
) -> Result<Option<Sale>, RepositoryError> {
    let current = get(conn, seller_id, id, true).await?;
    match current.status {
        SaleStatus::Refunded => Ok(None),
        _ => refund(conn, seller_id, id, Some("dispute lost")).await.map(Some),
    }
}

/// When `customer_id` most recently bought `product_id`, if the purchase still stands.
///
/// Only completed sales count; a refunded purchase grants nothing.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn latest_purchase_at(
    conn: &mut PgConnection,
    seller_id: SellerId,
    customer_id: CustomerId,
    product_id: ProductId,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let purchased_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT MAX(created_at) FROM desk.sales
         WHERE seller_id = $1 AND customer_id = $2 AND product_id = $3
           AND status = 'completed'",
    )
    .bind(seller_id)
    .bind(customer_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(purchased_at)
}
