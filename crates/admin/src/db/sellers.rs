//! Seller repository.

use sqlx::PgPool;

use shelfkeeper_core::{Email, SellerId};

use super::RepositoryError;
use crate::models::Seller;

/// Repository for seller accounts.
pub struct SellerRepository<'a> {
    pool: &'a PgPool,
}

/// Seller row including the password hash; only the auth service reads it.
#[derive(sqlx::FromRow)]
struct SellerWithHash {
    #[sqlx(flatten)]
    seller: Seller,
    password_hash: String,
}

impl<'a> SellerRepository<'a> {
    /// Create a new seller repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is already registered.
    pub async fn create(
        &self,
        email: &Email,
        password_hash: &str,
        display_name: &str,
        store_name: &str,
    ) -> Result<Seller, RepositoryError> {
        sqlx::query_as::<_, Seller>(
            r"
            INSERT INTO desk.sellers (email, password_hash, display_name, store_name)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, display_name, store_name, created_at, updated_at
            ",
        )
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .bind(store_name)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "email already registered"))
    }

    /// Get a seller by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: SellerId) -> Result<Option<Seller>, RepositoryError> {
        let seller = sqlx::query_as::<_, Seller>(
            r"
            SELECT id, email, display_name, store_name, created_at, updated_at
            FROM desk.sellers
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(seller)
    }

    /// Get a seller and their password hash by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email_with_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(Seller, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, SellerWithHash>(
            r"
            SELECT id, email, display_name, store_name, created_at, updated_at, password_hash
            FROM desk.sellers
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|r| (r.seller, r.password_hash)))
    }

    /// Update display and store names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the seller does not exist.
    pub async fn update_profile(
        &self,
        id: SellerId,
        display_name: &str,
        store_name: &str,
    ) -> Result<Seller, RepositoryError> {
        sqlx::query_as::<_, Seller>(
            r"
            UPDATE desk.sellers
            SET display_name = $2, store_name = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, display_name, store_name, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(display_name)
        .bind(store_name)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}
