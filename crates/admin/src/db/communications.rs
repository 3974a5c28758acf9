//! Communication and communication template repository.

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::{
    CommunicationId, CommunicationStatus, CommunicationTemplateId, CustomerId, SellerId,
};

use super::{Page, RepositoryError};
use crate::models::{Communication, CommunicationTemplate};

const TEMPLATE_COLUMNS: &str = "id, seller_id, name, subject, body, created_at, updated_at";

const COMMUNICATION_COLUMNS: &str = "id, seller_id, customer_id, template_id, recipient, \
                                     subject, body, status, error, sent_at, created_at";

/// Fields for a template.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
}

/// Partial template update.
#[derive(Debug, Clone, Default)]
pub struct TemplateChanges {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// Filters for the communication history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunicationFilter {
    pub customer_id: Option<CustomerId>,
    pub status: Option<CommunicationStatus>,
}

/// A rendered message ready to record.
#[derive(Debug, Clone)]
pub struct NewCommunication {
    pub customer_id: CustomerId,
    pub template_id: Option<CommunicationTemplateId>,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Repository for communications and their templates.
pub struct CommunicationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CommunicationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// List templates by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_templates(
        &self,
        seller_id: SellerId,
    ) -> Result<Vec<CommunicationTemplate>, RepositoryError> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM desk.communication_templates
             WHERE seller_id = $1 ORDER BY name"
        );
        let templates = sqlx::query_as::<_, CommunicationTemplate>(&sql)
            .bind(seller_id)
            .fetch_all(self.pool)
            .await?;
        Ok(templates)
    }

    /// Get a template.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist for this seller.
    pub async fn get_template(
        &self,
        seller_id: SellerId,
        id: CommunicationTemplateId,
    ) -> Result<CommunicationTemplate, RepositoryError> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM desk.communication_templates
             WHERE seller_id = $1 AND id = $2"
        );
        sqlx::query_as::<_, CommunicationTemplate>(&sql)
            .bind(seller_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a template.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_template(
        &self,
        seller_id: SellerId,
        new: &NewTemplate,
    ) -> Result<CommunicationTemplate, RepositoryError> {
        let sql = format!(
            "INSERT INTO desk.communication_templates (seller_id, name, subject, body)
             VALUES ($1, $2, $3, $4)
             RETURNING {TEMPLATE_COLUMNS}"
        );
        sqlx::query_as::<_, CommunicationTemplate>(&sql)
            .bind(seller_id)
            .bind(&new.name)
            .bind(&new.subject)
            .bind(&new.body)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "a template with this name already exists"))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` or `RepositoryError::Conflict`.
    pub async fn update_template(
        &self,
        seller_id: SellerId,
        id: CommunicationTemplateId,
        changes: &TemplateChanges,
    ) -> Result<CommunicationTemplate, RepositoryError> {
        let sql = format!(
            "UPDATE desk.communication_templates
             SET name = COALESCE($3, name),
                 subject = COALESCE($4, subject),
                 body = COALESCE($5, body),
                 updated_at = NOW()
             WHERE seller_id = $1 AND id = $2
             RETURNING {TEMPLATE_COLUMNS}"
        );
        sqlx::query_as::<_, CommunicationTemplate>(&sql)
            .bind(seller_id)
            .bind(id)
            .bind(changes.name.as_deref())
            .bind(changes.subject.as_deref())
            .bind(changes.body.as_deref())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "a template with this name already exists"))?
            .ok_or(RepositoryError::NotFound)
    }

    /// Delete a template. Sent messages keep their text.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist for this seller.
    pub async fn delete_template(
        &self,
        seller_id: SellerId,
        id: CommunicationTemplateId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM desk.communication_templates WHERE seller_id = $1 AND id = $2")
                .bind(seller_id)
                .bind(id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Message history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        seller_id: SellerId,
        filter: &CommunicationFilter,
        page: Page,
    ) -> Result<Vec<Communication>, RepositoryError> {
        let page = page.clamped();
        let sql = format!(
            "SELECT {COMMUNICATION_COLUMNS} FROM desk.communications
             WHERE seller_id = $1
               AND ($2::uuid IS NULL OR customer_id = $2)
               AND ($3::desk.communication_status IS NULL OR status = $3)
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5"
        );
        let messages = sqlx::query_as::<_, Communication>(&sql)
            .bind(seller_id)
            .bind(filter.customer_id)
            .bind(filter.status)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await?;
        Ok(messages)
    }

    /// Record a queued message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the customer or template is missing.
    pub async fn insert(
        &self,
        seller_id: SellerId,
        new: &NewCommunication,
    ) -> Result<Communication, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, seller_id, new).await
    }

    /// Mark a message delivered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist for this seller.
    pub async fn mark_sent(
        &self,
        seller_id: SellerId,
        id: CommunicationId,
    ) -> Result<Communication, RepositoryError> {
        let sql = format!(
            "UPDATE desk.communications
             SET status = 'sent', sent_at = NOW(), error = NULL
             WHERE seller_id = $1 AND id = $2
             RETURNING {COMMUNICATION_COLUMNS}"
        );
        sqlx::query_as::<_, Communication>(&sql)
            .bind(seller_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Mark a message undeliverable with the transport's error.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist for this seller.
    pub async fn mark_failed(
        &self,
        seller_id: SellerId,
        id: CommunicationId,
        error: &str,
    ) -> Result<Communication, RepositoryError> {
        let sql = format!(
            "UPDATE desk.communications
             SET status = 'failed', error = $3
             WHERE seller_id = $1 AND id = $2
             RETURNING {COMMUNICATION_COLUMNS}"
        );
        sqlx::query_as::<_, Communication>(&sql)
            .bind(seller_id)
            .bind(id)
            .bind(error)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Queued messages, oldest first.
    ///
    /// With `seller_id` set this is scoped like every other query. Without
    /// it, it spans sellers for the command-line flush, which then updates
    /// each row under its own `seller_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_queued(
        &self,
        seller_id: Option<SellerId>,
        limit: i64,
    ) -> Result<Vec<Communication>, RepositoryError> {
        let sql = format!(
            "SELECT {COMMUNICATION_COLUMNS} FROM desk.communications
             WHERE status = 'queued' AND ($1::uuid IS NULL OR seller_id = $1)
             ORDER BY created_at
             LIMIT $2"
        );
        let queued = sqlx::query_as::<_, Communication>(&sql)
            .bind(seller_id)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(queued)
    }
}

/// Record a queued message on `conn`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the customer or template is missing.
pub async fn insert(
    conn: &mut PgConnection,
    seller_id: SellerId,
    new: &NewCommunication,
) -> Result<Communication, RepositoryError> {
    let sql = format!(
        "INSERT INTO desk.communications
            (seller_id, customer_id, template_id, recipient, subject, body)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {COMMUNICATION_COLUMNS}"
    );
    sqlx::query_as::<_, Communication>(&sql)
        .bind(seller_id)
        .bind(new.customer_id)
        .bind(new.template_id)
        .bind(&new.recipient)
        .bind(&new.subject)
        .bind(&new.body)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "communication references a missing row"))
}
