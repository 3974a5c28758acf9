//! Dispute repository.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::{DisputeId, DisputeStatus, SaleId, SellerId};

use super::{Page, RepositoryError};
use crate::models::Dispute;

const DISPUTE_COLUMNS: &str = "id, seller_id, sale_id, reason, amount, status, evidence, \
                               opened_at, resolved_at, updated_at";

/// Repository for disputes.
pub struct DisputeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DisputeRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List disputes, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        status: Option<DisputeStatus>,
        page: Page,
    ) -> Result<Vec<Dispute>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {DISPUTE_COLUMNS} FROM desk.disputes
             WHERE seller_id = $1 AND ($2::desk.dispute_status IS NULL OR status = $2)
             ORDER BY opened_at DESC
             LIMIT $3 OFFSET $4"
        );
        let disputes = sqlx::query_as::<_, Dispute>(&sql)
            .bind(seller_id)
            .bind(status)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        Ok(disputes)
    }

    /// Get a dispute.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the dispute does not exist for this seller.
    pub async fn get(&self, seller_id: SellerId, id: DisputeId) -> Result<Dispute, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id, id, false).await
    }

    /// Append a note to the dispute's evidence.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the dispute does not exist for
    /// this seller, or `RepositoryError::Conflict` if it is already resolved.
    pub async fn add_evidence(
        &self,
        seller_id: SellerId,
        id: DisputeId,
        note: &str,
    ) -> Result<Dispute, RepositoryError> {
        let sql = format!(
            "UPDATE desk.disputes
             SET evidence = CASE
                     WHEN evidence IS NULL OR evidence = '' THEN $3
                     ELSE evidence || E'\\n\\n' || $3
                 END,
                 updated_at = NOW()
             WHERE seller_id = $1 AND id = $2 AND status IN ('open', 'under_review')
             RETURNING {DISPUTE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Dispute>(&sql)
            .bind(seller_id)
            .bind(id)
            .bind(note)
            .fetch_optional(self.pool)
            .await?;

        match updated {
            Some(dispute) => Ok(dispute),
            None => {
                let current = self.get(seller_id, id).await?;
                Err(RepositoryError::Conflict(format!(
                    "dispute is {}; evidence can no longer be added",
                    current.status
                )))
            }
        }
    }

    /// Number of disputes still open or under review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_unresolved(&self, seller_id: SellerId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM desk.disputes
             WHERE seller_id = $1 AND status IN ('open', 'under_review')",
        )
        .bind(seller_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}

/// Get a dispute on `conn`, optionally locking the row.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the dispute does not exist for this seller.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: DisputeId,
    for_update: bool,
) -> Result<Dispute, RepositoryError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!(
        "SELECT {DISPUTE_COLUMNS} FROM desk.disputes WHERE seller_id = $1 AND id = $2{lock}"
    );
    sqlx::query_as::<_, Dispute>(&sql)
        .bind(seller_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Open a dispute against a sale.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the sale already has an unresolved dispute.
pub async fn open(
    conn: &mut PgConnection,
    seller_id: SellerId,
    sale_id: SaleId,
    reason: &str,
    amount: Decimal,
) -> Result<Dispute, RepositoryError> {
    let sql = format!(
        "INSERT INTO desk.disputes (seller_id, sale_id, reason, amount)
         VALUES ($1, $2, $3, $4)
         RETURNING {DISPUTE_COLUMNS}"
    );
    sqlx::query_as::<_, Dispute>(&sql)
        .bind(seller_id)
        .bind(sale_id)
        .bind(reason)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "sale already has an unresolved dispute"))
}

/// Set a dispute's status. Terminal statuses stamp `resolved_at`.
///
/// Transition validity is the caller's concern.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the dispute does not exist for this seller.
pub async fn update_status(
    conn: &mut PgConnection,
    seller_id: SellerId,
    id: DisputeId,
    status: DisputeStatus,
) -> Result<Dispute, RepositoryError> {
    let sql = format!(
        "UPDATE desk.disputes
         SET status = $3,
             resolved_at = CASE WHEN $4 THEN NOW() ELSE NULL END,
             updated_at = NOW()
         WHERE seller_id = $1 AND id = $2
         RETURNING {DISPUTE_COLUMNS}"
    );
    sqlx::query_as::<_, Dispute>(&sql)
        .bind(seller_id)
        .bind(id)
        .bind(status)
        .bind(status.is_terminal())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)
}
