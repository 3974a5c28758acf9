//! Customer repository.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::{CustomerId, Email, SellerId};

use super::access_records::{AccessFilter, AccessRecordRepository};
use super::sales::{SaleFilter, SaleRepository};
use super::subscriptions::{SubscriptionFilter, SubscriptionRepository};
use super::{Page, RepositoryError};
use crate::models::{Customer, CustomerHistory};

/// Fields for creating a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub email: Email,
    pub name: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CustomerChanges {
    pub email: Option<Email>,
    pub name: Option<String>,
    pub notes: Option<String>,
}

/// Repository for customers.
pub struct CustomerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CustomerRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List customers, newest first, optionally matching `search` against
    /// email and name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        search: Option<&str>,
        page: Page,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let page = page.clamped();
        let customers = sqlx::query_as::<_, Customer>(
            r"
            SELECT id, seller_id, email, name, notes, created_at, updated_at
            FROM desk.customers
            WHERE seller_id = $1
              AND ($2::text IS NULL
                   OR email ILIKE '%' || $2 || '%'
                   OR name ILIKE '%' || $2 || '%')
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(seller_id)
        .bind(search)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await?;
        Ok(customers)
    }

    /// Count customers matching the same filter as [`Self::list`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(
        &self,
        seller_id: SellerId,
        search: Option<&str>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM desk.customers
            WHERE seller_id = $1
              AND ($2::text IS NULL
                   OR email ILIKE '%' || $2 || '%'
                   OR name ILIKE '%' || $2 || '%')
            ",
        )
        .bind(seller_id)
        .bind(search)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Get a customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer does not exist for this seller.
    pub async fn get(
        &self,
        seller_id: SellerId,
        id: CustomerId,
    ) -> Result<Customer, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id, id, false).await
    }

    /// A customer with their recent sales, subscriptions and access records.
    ///
    /// Each list holds at most [`Page::MAX_LIMIT`] newest entries; the
    /// lifetime value covers every completed sale.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer does not exist for this seller.
    pub async fn history(
        &self,
        seller_id: SellerId,
        id: CustomerId,
    ) -> Result<CustomerHistory, RepositoryError> {
        let customer = self.get(seller_id, id).await?;
        let page = Page {
            limit: Page::MAX_LIMIT,
            offset: 0,
        };

        let sales = SaleRepository::new(self.pool)
            .list(
                seller_id,
                &SaleFilter {
                    customer_id: Some(id),
                    ..SaleFilter::default()
                },
                page,
            )
            .await?;
        let subscriptions = SubscriptionRepository::new(self.pool)
            .list(
                seller_id,
                &SubscriptionFilter {
                    customer_id: Some(id),
                    ..SubscriptionFilter::default()
                },
                page,
            )
            .await?;
        let access_records = AccessRecordRepository::new(self.pool)
            .list(
                seller_id,
                &AccessFilter {
                    customer_id: Some(id),
                    ..AccessFilter::default()
                },
                page,
            )
            .await?;

        let lifetime_value: Decimal = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(total), 0)
            FROM desk.sales
            WHERE seller_id = $1 AND customer_id = $2 AND status = 'completed'
            ",
        )
        .bind(seller_id)
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(CustomerHistory {
            customer,
            sales,
            subscriptions,
            access_records,
            lifetime_value,
        })
    }

    /// Create a customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the seller already has a customer with this email.
    pub async fn create(
        &self,
        seller_id: SellerId,
        new: &NewCustomer,
    ) -> Result<Customer, RepositoryError> {
        sqlx::query_as::<_, Customer>(
            r"
            INSERT INTO desk.customers (seller_id, email, name, notes)
            VALUES ($1, $2, $3, $4)
            RETURNING id, seller_id, email, name, notes, created_at, updated_at
            ",
        )
        .bind(seller_id)
        .bind(&new.email)
        .bind(new.name.as_deref())
        .bind(new.notes.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "a customer with this email already exists"))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` or `RepositoryError::Conflict`.
    pub async fn update(
        &self,
        seller_id: SellerId,
        id: CustomerId,
        changes: &CustomerChanges,
    ) -> Result<Customer, RepositoryError> {
        sqlx::query_as::<_, Customer>(
            r"
            UPDATE desk.customers
            SET email = COALESCE($3, email),
                name = COALESCE($4, name),
                notes = COALESCE($5, notes),
                updated_at = NOW()
            WHERE seller_id = $1 AND id = $2
            RETURNING id, seller_id, email, name, notes, created_at, updated_at
            ",
        )
        .bind(seller_id)
        .bind(id)
        .bind(changes.email.as_ref())
        .bind(changes.name.as_deref())
        .bind(changes.notes.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "a customer with this email already exists"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the customer has sales, or
    /// `RepositoryError::NotFound`.
    pub async fn delete(&self, seller_id: SellerId, id: CustomerId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM desk.customers WHERE seller_id = $1 AND id = $2")
            .bind(seller_id)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                RepositoryError::from_constraint(e, "customer has sales and cannot be deleted")
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Get a customer on `conn`. With `for_update` the row stays locked until
/// the caller's transaction ends, which serialises per-customer writes such
/// as default payment method changes and download counting.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the customer does not exist for this seller.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: CustomerId,
    for_update: bool,
) -> Result<Customer, RepositoryError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!(
        "SELECT id, seller_id, email, name, notes, created_at, updated_at
         FROM desk.customers
         WHERE seller_id = $1 AND id = $2{lock}"
    );
    sqlx::query_as::<_, Customer>(&sql)
        .bind(seller_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}
