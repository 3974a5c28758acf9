//! Seller notification repository.

use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::{NotificationId, NotificationKind, SellerId};

use super::{Page, RepositoryError};
use crate::models::Notification;

const NOTIFICATION_COLUMNS: &str = "id, seller_id, kind, title, body, link, read_at, created_at";

/// A notification to create.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

/// Repository for notifications.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM desk.notifications
             WHERE seller_id = $1 AND (NOT $2 OR read_at IS NULL)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4"
        );
        let notifications = sqlx::query_as::<_, Notification>(&sql)
            .bind(seller_id)
            .bind(unread_only)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        Ok(notifications)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unread_count(&self, seller_id: SellerId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM desk.notifications WHERE seller_id = $1 AND read_at IS NULL",
        )
        .bind(seller_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        seller_id: SellerId,
        new: &NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        create(&mut conn, seller_id, new).await
    }

    /// Mark one notification read. Already-read notifications keep their
    /// original `read_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist for this seller.
    pub async fn mark_read(
        &self,
        seller_id: SellerId,
        id: NotificationId,
    ) -> Result<Notification, RepositoryError> {
        let sql = format!(
            "UPDATE desk.notifications SET read_at = COALESCE(read_at, NOW())
             WHERE seller_id = $1 AND id = $2
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&sql)
            .bind(seller_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Mark everything read. Returns how many were unread.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_all_read(&self, seller_id: SellerId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE desk.notifications SET read_at = NOW()
             WHERE seller_id = $1 AND read_at IS NULL",
        )
        .bind(seller_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Create a notification on `conn`, usually inside the transaction of the
/// event it reports.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn create(
    conn: &mut PgConnection,
    seller_id: SellerId,
    new: &NewNotification,
) -> Result<Notification, RepositoryError> {
    let sql = format!(
        "INSERT INTO desk.notifications (seller_id, kind, title, body, link)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {NOTIFICATION_COLUMNS}"
    );
    let notification = sqlx::query_as::<_, Notification>(&sql)
        .bind(seller_id)
        .bind(new.kind)
        .bind(&new.title)
        .bind(&new.body)
        .bind(new.link.as_deref())
        .fetch_one(&mut *conn)
        .await?;
    Ok(notification)
}
