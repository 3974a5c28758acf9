//! Access record repository.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::sale::SaleTarget;
use shelfkeeper_core::{AccessType, CustomerId, MembershipId, ProductFileId, ProductId, SellerId};

use super::{Page, RepositoryError};
use crate::models::{AccessRecord, AccessSummary};

const ACCESS_COLUMNS: &str = "id, seller_id, customer_id, product_id, membership_id, \
                              product_file_id, access_type, ip_address, user_agent, accessed_at";

/// Filters for listing access records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessFilter {
    pub customer_id: Option<CustomerId>,
    pub product_id: Option<ProductId>,
    pub membership_id: Option<MembershipId>,
    pub access_type: Option<AccessType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Fields for recording an access.
#[derive(Debug, Clone)]
pub struct NewAccessRecord {
    pub customer_id: CustomerId,
    pub target: SaleTarget,
    pub product_file_id: Option<ProductFileId>,
    pub access_type: AccessType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    views: i64,
    downloads: i64,
    streams: i64,
    unique_customers: i64,
}

/// Repository for access records.
pub struct AccessRecordRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AccessRecordRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List access records matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        filter: &AccessFilter,
        page: Page,
    ) -> Result<Vec<AccessRecord>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {ACCESS_COLUMNS} FROM desk.access_records
             WHERE seller_id = $1
               AND ($2::uuid IS NULL OR customer_id = $2)
               AND ($3::uuid IS NULL OR product_id = $3)
               AND ($4::uuid IS NULL OR membership_id = $4)
               AND ($5::desk.access_type IS NULL OR access_type = $5)
               AND ($6::timestamptz IS NULL OR accessed_at >= $6)
               AND ($7::timestamptz IS NULL OR accessed_at < $7)
             ORDER BY accessed_at DESC
             LIMIT $8 OFFSET $9"
        );
        let records = sqlx::query_as::<_, AccessRecord>(&sql)
            .bind(seller_id)
            .bind(filter.customer_id)
            .bind(filter.product_id)
            .bind(filter.membership_id)
            .bind(filter.access_type)
            .bind(filter.from)
            .bind(filter.to)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        Ok(records)
    }

    /// Access counts by type over the same filter as [`Self::list`].
    ///
    /// `filter.access_type` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(
        &self,
        seller_id: SellerId,
        filter: &AccessFilter,
    ) -> Result<AccessSummary, RepositoryError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r"
            SELECT
                COUNT(*) FILTER (WHERE access_type = 'view') AS views,
                COUNT(*) FILTER (WHERE access_type = 'download') AS downloads,
                COUNT(*) FILTER (WHERE access_type = 'stream') AS streams,
                COUNT(DISTINCT customer_id) AS unique_customers
            FROM desk.access_records
            WHERE seller_id = $1
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::uuid IS NULL OR product_id = $3)
              AND ($4::uuid IS NULL OR membership_id = $4)
              AND ($5::timestamptz IS NULL OR accessed_at >= $5)
              AND ($6::timestamptz IS NULL OR accessed_at < $6)
            ",
        )
        .bind(seller_id)
        .bind(filter.customer_id)
        .bind(filter.product_id)
        .bind(filter.membership_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(self.pool)
        .await?;

        Ok(AccessSummary {
            views: row.views,
            downloads: row.downloads,
            streams: row.streams,
            unique_customers: row.unique_customers,
        })
    }
}

/// Record an access on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if a referenced row does not exist.
pub async fn insert(
    conn: &mut PgConnection,
    seller_id: SellerId,
    new: &NewAccessRecord,
) -> Result<AccessRecord, RepositoryError> {
    let sql = format!(
        "INSERT INTO desk.access_records
            (seller_id, customer_id, product_id, membership_id, product_file_id, access_type,
             ip_address, user_agent)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {ACCESS_COLUMNS}"
    );
    sqlx::query_as::<_, AccessRecord>(&sql)
        .bind(seller_id)
        .bind(new.customer_id)
        .bind(new.target.product_id())
        .bind(new.target.membership_id())
        .bind(new.product_file_id)
        .bind(new.access_type)
        .bind(new.ip_address.as_deref())
        .bind(new.user_agent.as_deref())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "access record references a missing row"))
}

/// Downloads `customer_id` has made of `product_id`'s files.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn download_count(
    conn: &mut PgConnection,
    seller_id: SellerId,
    customer_id: CustomerId,
    product_id: ProductId,
) -> Result<i64, RepositoryError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM desk.access_records
         WHERE seller_id = $1 AND customer_id = $2 AND product_id = $3
           AND access_type = 'download'",
    )
    .bind(seller_id)
    .bind(customer_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}
