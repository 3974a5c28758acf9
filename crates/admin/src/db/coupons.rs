//! Coupon repository.
//!
//! Coupons are read with their eligibility lists aggregated into arrays, so
//! a [`Coupon`] is always complete. Redemption happens in the caller's sale
//! transaction: [`get_by_code_for_update`] locks the coupon row, the caller
//! evaluates the rules, and [`record_redemption`] bumps the counter and
//! writes the redemption row before the transaction commits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::coupon::Discount;
use shelfkeeper_core::{
    CouponId, CustomerId, DiscountType, MembershipId, ProductId, SaleId, SellerId,
};

use super::{Page, RepositoryError};
use crate::models::{Coupon, CouponRedemption};

const COUPON_SELECT: &str = "SELECT c.id, c.seller_id, c.code, c.description, c.discount_type, \
       c.discount_value, c.is_active, c.starts_at, c.expires_at, c.min_purchase, \
       c.max_redemptions, c.max_per_customer, c.times_redeemed, c.created_at, c.updated_at, \
       ARRAY(SELECT cp.product_id FROM desk.coupon_products cp \
             WHERE cp.coupon_id = c.id ORDER BY cp.product_id) AS product_ids, \
       ARRAY(SELECT cm.membership_id FROM desk.coupon_memberships cm \
             WHERE cm.coupon_id = c.id ORDER BY cm.membership_id) AS membership_ids \
     FROM desk.coupons c";

const REDEMPTION_COLUMNS: &str = "id, coupon_id, customer_id, sale_id, discount, created_at";

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: CouponId,
    seller_id: SellerId,
    code: String,
    description: Option<String>,
    discount_type: DiscountType,
    discount_value: Decimal,
    is_active: bool,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    min_purchase: Option<Decimal>,
    max_redemptions: Option<i32>,
    max_per_customer: Option<i32>,
    times_redeemed: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    product_ids: Vec<ProductId>,
    membership_ids: Vec<MembershipId>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = RepositoryError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let discount = Discount::new(row.discount_type, row.discount_value)
            .map_err(|e| RepositoryError::DataCorruption(format!("coupon {}: {e}", row.id)))?;

        Ok(Self {
            id: row.id,
            seller_id: row.seller_id,
            code: row.code,
            description: row.description,
            discount,
            is_active: row.is_active,
            starts_at: row.starts_at,
            expires_at: row.expires_at,
            min_purchase: row.min_purchase,
            max_redemptions: row.max_redemptions,
            max_per_customer: row.max_per_customer,
            times_redeemed: row.times_redeemed,
            product_ids: row.product_ids,
            membership_ids: row.membership_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fields for creating a coupon. `code` must already be normalised.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub description: Option<String>,
    pub discount: Discount,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Decimal>,
    pub max_redemptions: Option<i32>,
    pub max_per_customer: Option<i32>,
    pub product_ids: Vec<ProductId>,
    pub membership_ids: Vec<MembershipId>,
}

/// Partial update; `None` leaves a field unchanged, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct CouponChanges {
    pub code: Option<String>,
    pub description: Option<String>,
    pub discount: Option<Discount>,
    pub starts_at: Option<Option<DateTime<Utc>>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub min_purchase: Option<Option<Decimal>>,
    pub max_redemptions: Option<Option<i32>>,
    pub max_per_customer: Option<Option<i32>>,
    /// Replaces the eligibility lists when set.
    pub eligibility: Option<(Vec<ProductId>, Vec<MembershipId>)>,
}

/// Repository for coupons.
pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List coupons, newest first, optionally filtered by active flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` or `RepositoryError::DataCorruption`.
    pub async fn list(
        &self,
        seller_id: SellerId,
        active: Option<bool>,
        page: Page,
    ) -> Result<Vec<Coupon>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "{COUPON_SELECT}
             WHERE c.seller_id = $1 AND ($2::boolean IS NULL OR c.is_active = $2)
             ORDER BY c.created_at DESC
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, CouponRow>(&sql)
            .bind(seller_id)
            .bind(active)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon does not exist for this seller.
    pub async fn get(&self, seller_id: SellerId, id: CouponId) -> Result<Coupon, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id, id).await
    }

    /// Find a coupon by code without locking it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no coupon has this code.
    pub async fn get_by_code(&self, seller_id: SellerId, code: &str) -> Result<Coupon, RepositoryError> {
        let sql = format!("{COUPON_SELECT} WHERE c.seller_id = $1 AND c.code = $2");
        sqlx::query_as::<_, CouponRow>(&sql)
            .bind(seller_id)
            .bind(code)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    /// Create a coupon with its eligibility lists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken or the values
    /// are invalid, and `RepositoryError::NotFound` if an eligible product or
    /// membership does not belong to this seller.
    pub async fn create(&self, seller_id: SellerId, new: &NewCoupon) -> Result<Coupon, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: CouponId = sqlx::query_scalar(
            r"
            INSERT INTO desk.coupons
                (seller_id, code, description, discount_type, discount_value, is_active,
                 starts_at, expires_at, min_purchase, max_redemptions, max_per_customer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            ",
        )
        .bind(seller_id)
        .bind(&new.code)
        .bind(new.description.as_deref())
        .bind(new.discount.discount_type())
        .bind(new.discount.value())
        .bind(new.is_active)
        .bind(new.starts_at)
        .bind(new.expires_at)
        .bind(new.min_purchase)
        .bind(new.max_redemptions)
        .bind(new.max_per_customer)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "coupon code already exists or values are invalid"))?;

        replace_eligibility(&mut tx, seller_id, id, &new.product_ids, &new.membership_ids).await?;
        let coupon = get(&mut tx, seller_id, id).await?;

        tx.commit().await?;
        Ok(coupon)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` or `RepositoryError::Conflict`.
    pub async fn update(
        &self,
        seller_id: SellerId,
        id: CouponId,
        changes: &CouponChanges,
    ) -> Result<Coupon, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            UPDATE desk.coupons
            SET code = COALESCE($3, code),
                description = COALESCE($4, description),
                discount_type = COALESCE($5, discount_type),
                discount_value = COALESCE($6, discount_value),
                starts_at = CASE WHEN $7 THEN $8 ELSE starts_at END,
                expires_at = CASE WHEN $9 THEN $10 ELSE expires_at END,
                min_purchase = CASE WHEN $11 THEN $12 ELSE min_purchase END,
                max_redemptions = CASE WHEN $13 THEN $14 ELSE max_redemptions END,
                max_per_customer = CASE WHEN $15 THEN $16 ELSE max_per_customer END,
                updated_at = NOW()
            WHERE seller_id = $1 AND id = $2
            ",
        )
        .bind(seller_id)
        .bind(id)
        .bind(changes.code.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.discount.map(|d| d.discount_type()))
        .bind(changes.discount.map(|d| d.value()))
        .bind(changes.starts_at.is_some())
        .bind(changes.starts_at.flatten())
        .bind(changes.expires_at.is_some())
        .bind(changes.expires_at.flatten())
        .bind(changes.min_purchase.is_some())
        .bind(changes.min_purchase.flatten())
        .bind(changes.max_redemptions.is_some())
        .bind(changes.max_redemptions.flatten())
        .bind(changes.max_per_customer.is_some())
        .bind(changes.max_per_customer.flatten())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "coupon code already exists or values are invalid"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        if let Some((product_ids, membership_ids)) = &changes.eligibility {
            replace_eligibility(&mut tx, seller_id, id, product_ids, membership_ids).await?;
        }
        let coupon = get(&mut tx, seller_id, id).await?;

        tx.commit().await?;
        Ok(coupon)
    }

    /// Enable or disable a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon does not exist for this seller.
    pub async fn set_active(
        &self,
        seller_id: SellerId,
        id: CouponId,
        is_active: bool,
    ) -> Result<Coupon, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE desk.coupons SET is_active = $3, updated_at = NOW()
             WHERE seller_id = $1 AND id = $2",
        )
        .bind(seller_id)
        .bind(id)
        .bind(is_active)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        let coupon = get(&mut tx, seller_id, id).await?;
        tx.commit().await?;
        Ok(coupon)
    }

    /// Delete a coupon. Past sales keep their amounts and lose the link.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon does not exist for this seller.
    pub async fn delete(&self, seller_id: SellerId, id: CouponId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM desk.coupons WHERE seller_id = $1 AND id = $2")
            .bind(seller_id)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Redemptions of one coupon, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn redemptions(
        &self,
        seller_id: SellerId,
        id: CouponId,
        page: Page,
    ) -> Result<Vec<CouponRedemption>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {REDEMPTION_COLUMNS} FROM desk.coupon_redemptions
             WHERE seller_id = $1 AND coupon_id = $2
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4"
        );
        let redemptions = sqlx::query_as::<_, CouponRedemption>(&sql)
            .bind(seller_id)
            .bind(id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        Ok(redemptions)
    }

    /// How many times `customer_id` has redeemed `id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn customer_redemption_count(
        &self,
        seller_id: SellerId,
        id: CouponId,
        customer_id: CustomerId,
    ) -> Result<i64, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        customer_redemption_count(&mut conn, seller_id, id, customer_id).await
    }
}

/// Get a coupon on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the coupon does not exist for this seller.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: CouponId,
) -> Result<Coupon, RepositoryError> {
    let sql = format!("{COUPON_SELECT} WHERE c.seller_id = $1 AND c.id = $2");
    sqlx::query_as::<_, CouponRow>(&sql)
        .bind(seller_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
}

/// Find a coupon by normalised code and lock its row until the caller's
/// transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no coupon has this code.
pub async fn get_by_code_for_update(
    conn: &mut PgConnection,
    seller_id: SellerId,
    code: &str,
) -> Result<Coupon, RepositoryError> {
    let sql = format!("{COUPON_SELECT} WHERE c.seller_id = $1 AND c.code = $2 FOR UPDATE OF c");
    sqlx::query_as::<_, CouponRow>(&sql)
        .bind(seller_id)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
}

/// Redemptions of `id` by `customer_id` on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn customer_redemption_count(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: CouponId,
    customer_id: CustomerId,
) -> Result<i64, RepositoryError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM desk.coupon_redemptions
         WHERE seller_id = $1 AND coupon_id = $2 AND customer_id = $3",
    )
    .bind(seller_id)
    .bind(id)
    .bind(customer_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Count one use of a locked coupon and write the redemption row.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the coupon vanished, or
/// `RepositoryError::Conflict` if the sale already has a redemption.
pub async fn record_redemption(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: CouponId,
    customer_id: CustomerId,
    sale_id: SaleId,
    discount: Decimal,
) -> Result<CouponRedemption, RepositoryError> {
    let result = sqlx::query(
        "UPDATE desk.coupons SET times_redeemed = times_redeemed + 1, updated_at = NOW()
         WHERE seller_id = $1 AND id = $2",
    )
    .bind(seller_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }

    let sql = format!(
        "INSERT INTO desk.coupon_redemptions (seller_id, coupon_id, customer_id, sale_id, discount)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {REDEMPTION_COLUMNS}"
    );
    sqlx::query_as::<_, CouponRedemption>(&sql)
        .bind(seller_id)
        .bind(id)
        .bind(customer_id)
        .bind(sale_id)
        .bind(discount)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "sale already has a coupon redemption"))
}

/// Replace a coupon's eligible products and memberships.
///
/// Rows are inserted from the seller's own tables, so an ID owned by another
/// seller inserts nothing and the count check fails.
async fn replace_eligibility(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: CouponId,
    product_ids: &[ProductId],
    membership_ids: &[MembershipId],
) -> Result<(), RepositoryError> {
    sqlx::query(
        "DELETE FROM desk.coupon_products cp USING desk.coupons c
         WHERE cp.coupon_id = c.id AND c.seller_id = $1 AND c.id = $2",
    )
    .bind(seller_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "DELETE FROM desk.coupon_memberships cm USING desk.coupons c
         WHERE cm.coupon_id = c.id AND c.seller_id = $1 AND c.id = $2",
    )
    .bind(seller_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    let mut products = product_ids.to_vec();
    products.sort_unstable();
    products.dedup();
    let inserted = sqlx::query(
        "INSERT INTO desk.coupon_products (coupon_id, product_id)
         SELECT $2, p.id FROM desk.products p WHERE p.seller_id = $1 AND p.id = ANY($3)",
    )
    .bind(seller_id)
    .bind(id)
    .bind(&products)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if usize::try_from(inserted).ok() != Some(products.len()) {
        return Err(RepositoryError::NotFound);
    }

    let mut memberships = membership_ids.to_vec();
    memberships.sort_unstable();
    memberships.dedup();
    let inserted = sqlx::query(
        "INSERT INTO desk.coupon_memberships (coupon_id, membership_id)
         SELECT $2, m.id FROM desk.memberships m WHERE m.seller_id = $1 AND m.id = ANY($3)",
    )
    .bind(seller_id)
    .bind(id)
    .bind(&memberships)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if usize::try_from(inserted).ok() != Some(memberships.len()) {
        return Err(RepositoryError::NotFound);
    }

    Ok(())
}
