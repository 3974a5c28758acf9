//! Membership repository.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::{BillingCycle, CurrencyCode, MembershipId, SellerId};

use super::{Page, RepositoryError};
use crate::models::Membership;

/// Fields for creating a membership.
#[derive(Debug, Clone)]
pub struct NewMembership {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub billing_cycle: BillingCycle,
    pub trial_days: i32,
}

/// Partial update. Billing cycle and currency are fixed once created.
#[derive(Debug, Clone, Default)]
pub struct MembershipChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub trial_days: Option<i32>,
}

/// Repository for memberships.
pub struct MembershipRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> MembershipRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List memberships, optionally only active (or only inactive) ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        active: Option<bool>,
        page: Page,
    ) -> Result<Vec<Membership>, RepositoryError> {
        let page = page.clamped();
        let memberships = sqlx::query_as::<_, Membership>(
            r"
            SELECT id, seller_id, name, description, price, currency, billing_cycle,
                   trial_days, is_active, created_at, updated_at
            FROM desk.memberships
            WHERE seller_id = $1 AND ($2::boolean IS NULL OR is_active = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(seller_id)
        .bind(active)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;
        Ok(memberships)
    }

    /// Get a membership.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the membership does not exist for this seller.
    pub async fn get(
        &self,
        seller_id: SellerId,
        id: MembershipId,
    ) -> Result<Membership, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id, id).await
    }

    /// Create a membership.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a column constraint fails.
    pub async fn create(
        &self,
        seller_id: SellerId,
        new: &NewMembership,
    ) -> Result<Membership, RepositoryError> {
        sqlx::query_as::<_, Membership>(
            r"
            INSERT INTO desk.memberships
                (seller_id, name, description, price, currency, billing_cycle, trial_days)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, seller_id, name, description, price, currency, billing_cycle,
                      trial_days, is_active, created_at, updated_at
            ",
        )
        .bind(seller_id)
        .bind(&new.name)
        .bind(new.description.as_deref())
        .bind(new.price)
        .bind(new.currency)
        .bind(new.billing_cycle)
        .bind(new.trial_days)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "invalid membership values"))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` or `RepositoryError::Conflict`.
    pub async fn update(
        &self,
        seller_id: SellerId,
        id: MembershipId,
        changes: &MembershipChanges,
    ) -> Result<Membership, RepositoryError> {
        sqlx::query_as::<_, Membership>(
            r"
            UPDATE desk.memberships
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                price = COALESCE($5, price),
                trial_days = COALESCE($6, trial_days),
                updated_at = NOW()
            WHERE seller_id = $1 AND id = $2
            RETURNING id, seller_id, name, description, price, currency, billing_cycle,
                      trial_days, is_active, created_at, updated_at
            ",
        )
        .bind(seller_id)
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.price)
        .bind(changes.trial_days)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "invalid membership values"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Activate or deactivate a membership.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the membership does not exist for this seller.
    pub async fn set_active(
        &self,
        seller_id: SellerId,
        id: MembershipId,
        active: bool,
    ) -> Result<Membership, RepositoryError> {
        sqlx::query_as::<_, Membership>(
            r"
            UPDATE desk.memberships SET is_active = $3, updated_at = NOW()
            WHERE seller_id = $1 AND id = $2
            RETURNING id, seller_id, name, description, price, currency, billing_cycle,
                      trial_days, is_active, created_at, updated_at
            ",
        )
        .bind(seller_id)
        .bind(id)
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a membership.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if it has subscriptions or sales.
    pub async fn delete(
        &self,
        seller_id: SellerId,
        id: MembershipId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM desk.memberships WHERE seller_id = $1 AND id = $2")
            .bind(seller_id)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                RepositoryError::from_constraint(
                    e,
                    "membership has subscribers or sales; deactivate it instead",
                )
            })?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Get a membership on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the membership does not exist for this seller.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: MembershipId,
) -> Result<Membership, RepositoryError> {
    sqlx::query_as::<_, Membership>(
        r"
        SELECT id, seller_id, name, description, price, currency, billing_cycle,
               trial_days, is_active, created_at, updated_at
        FROM desk.memberships
        WHERE seller_id = $1 AND id = $2
        ",
    )
    .bind(seller_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}
