//! Customer payment method repository.
//!
//! A customer has at most one default method. The partial unique index
//! `customer_payment_methods_one_default` enforces that in the database; the
//! functions here keep it true by locking the customer's methods and
//! changing defaults inside one transaction.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::payment_method::{DefaultCandidate, choose_replacement_default};
use shelfkeeper_core::{CustomerId, PaymentMethodId, PaymentMethodKind, SellerId};

use super::{RepositoryError, customers};
use crate::models::PaymentMethod;

const PAYMENT_METHOD_COLUMNS: &str = "id, seller_id, customer_id, kind, label, last4, exp_month, \
                                      exp_year, is_default, created_at";

/// Fields for adding a payment method.
#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub kind: PaymentMethodKind,
    pub label: String,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    /// Make this the default even if another default exists.
    pub make_default: bool,
}

/// Repository for payment methods.
pub struct PaymentMethodRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentMethodRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List a customer's methods, default first, then newest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_customer(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        list_for_customer(&mut conn, seller_id, customer_id, false).await
    }

    /// Add a method. The customer's first method always becomes the default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer does not exist for
    /// this seller, or `RepositoryError::Conflict` for invalid card details.
    pub async fn add(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
        new: &NewPaymentMethod,
    ) -> Result<PaymentMethod, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        customers::get(&mut tx, seller_id, customer_id, true).await?;

        let existing = list_for_customer(&mut tx, seller_id, customer_id, true).await?;
        let is_default = new.make_default || !existing.iter().any(|pm| pm.is_default);
        if is_default {
            clear_default(&mut tx, seller_id, customer_id).await?;
        }

        let sql = format!(
            "INSERT INTO desk.customer_payment_methods
                (seller_id, customer_id, kind, label, last4, exp_month, exp_year, is_default)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {PAYMENT_METHOD_COLUMNS}"
        );
        let method = sqlx::query_as::<_, PaymentMethod>(&sql)
            .bind(seller_id)
            .bind(customer_id)
            .bind(new.kind)
            .bind(&new.label)
            .bind(new.last4.as_deref())
            .bind(new.exp_month)
            .bind(new.exp_year)
            .bind(is_default)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "invalid payment method details"))?;

        tx.commit().await?;
        Ok(method)
    }

    /// Make `id` the customer's only default method.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the method does not belong to
    /// this seller's customer.
    pub async fn set_default(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        customers::get(&mut tx, seller_id, customer_id, true).await?;

        let methods = list_for_customer(&mut tx, seller_id, customer_id, true).await?;
        if !methods.iter().any(|pm| pm.id == id) {
            return Err(RepositoryError::NotFound);
        }

        clear_default(&mut tx, seller_id, customer_id).await?;
        let method = mark_default(&mut tx, seller_id, id).await?;

        tx.commit().await?;
        Ok(method)
    }

    /// Remove a method. If it was the default, promote a replacement.
    ///
    /// Returns the new default, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the method does not belong to
    /// this seller's customer.
    pub async fn remove(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
        id: PaymentMethodId,
        today: NaiveDate,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        customers::get(&mut tx, seller_id, customer_id, true).await?;

        let methods = list_for_customer(&mut tx, seller_id, customer_id, true).await?;
        let removed = methods
            .iter()
            .find(|pm| pm.id == id)
            .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            "DELETE FROM desk.customer_payment_methods
             WHERE seller_id = $1 AND customer_id = $2 AND id = $3",
        )
        .bind(seller_id)
        .bind(customer_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let new_default = if removed.is_default {
            let candidates: Vec<DefaultCandidate> = methods
                .iter()
                .filter(|pm| pm.id != id)
                .map(DefaultCandidate::from)
                .collect();
            match choose_replacement_default(&candidates, today) {
                Some(replacement) => Some(mark_default(&mut tx, seller_id, replacement).await?),
                None => None,
            }
        } else {
            methods.into_iter().find(|pm| pm.is_default)
        };

        tx.commit().await?;
        Ok(new_default)
    }

    /// The customer's default method, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_default(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get_default(&mut conn, seller_id, customer_id).await
    }
}

async fn list_for_customer(
    conn: &mut PgConnection,
    seller_id: SellerId,
    customer_id: CustomerId,
    for_update: bool,
) -> Result<Vec<PaymentMethod>, RepositoryError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!(
        "SELECT {PAYMENT_METHOD_COLUMNS} FROM desk.customer_payment_methods
         WHERE seller_id = $1 AND customer_id = $2
         ORDER BY is_default DESC, created_at DESC{lock}"
    );
    let methods = sqlx::query_as::<_, PaymentMethod>(&sql)
        .bind(seller_id)
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(methods)
}

async fn clear_default(
    conn: &mut PgConnection,
    seller_id: SellerId,
    customer_id: CustomerId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE desk.customer_payment_methods SET is_default = FALSE
         WHERE seller_id = $1 AND customer_id = $2 AND is_default",
    )
    .bind(seller_id)
    .bind(customer_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn mark_default(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: PaymentMethodId,
) -> Result<PaymentMethod, RepositoryError> {
    let sql = format!(
        "UPDATE desk.customer_payment_methods SET is_default = TRUE
         WHERE seller_id = $1 AND id = $2
         RETURNING {PAYMENT_METHOD_COLUMNS}"
    );
    sqlx::query_as::<_, PaymentMethod>(&sql)
        .bind(seller_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// The customer's default method on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_default(
    conn: &mut PgConnection,
    seller_id: SellerId,
    customer_id: CustomerId,
) -> Result<Option<PaymentMethod>, RepositoryError> {
    let sql = format!(
        "SELECT {PAYMENT_METHOD_COLUMNS} FROM desk.customer_payment_methods
         WHERE seller_id = $1 AND customer_id = $2 AND is_default"
    );
    let method = sqlx::query_as::<_, PaymentMethod>(&sql)
        .bind(seller_id)
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(method)
}

/// Get one method for a customer on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the method does not belong to this
/// seller's customer.
pub async fn get_for_customer(
    conn: &mut PgConnection,
    seller_id: SellerId,
    customer_id: CustomerId,
    id: PaymentMethodId,
) -> Result<PaymentMethod, RepositoryError> {
    let sql = format!(
        "SELECT {PAYMENT_METHOD_COLUMNS} FROM desk.customer_payment_methods
         WHERE seller_id = $1 AND customer_id = $2 AND id = $3"
    );
    sqlx::query_as::<_, PaymentMethod>(&sql)
        .bind(seller_id)
        .bind(customer_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}
