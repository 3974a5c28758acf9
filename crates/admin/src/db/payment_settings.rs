//! Payment settings repository.

use sqlx::{PgConnection, PgPool};

use shelfkeeper_core::{CurrencyCode, SellerId};

use super::RepositoryError;
use crate::models::PaymentSettings;

const SETTINGS_COLUMNS: &str =
    "seller_id, currency, payout_email, statement_descriptor, send_receipts, updated_at";

/// A full replacement of a seller's settings.
#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub currency: CurrencyCode,
    pub payout_email: Option<String>,
    pub statement_descriptor: Option<String>,
    pub send_receipts: bool,
}

/// Repository for payment settings.
pub struct PaymentSettingsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentSettingsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The seller's settings, or the defaults if none were saved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, seller_id: SellerId) -> Result<PaymentSettings, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, seller_id).await
    }

    /// Insert or replace the seller's settings.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the values break a constraint.
    pub async fn upsert(
        &self,
        seller_id: SellerId,
        update: &SettingsUpdate,
    ) -> Result<PaymentSettings, RepositoryError> {
        let sql = format!(
            "INSERT INTO desk.payment_settings
                (seller_id, currency, payout_email, statement_descriptor, send_receipts)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (seller_id) DO UPDATE
             SET currency = EXCLUDED.currency,
                 payout_email = EXCLUDED.payout_email,
                 statement_descriptor = EXCLUDED.statement_descriptor,
                 send_receipts = EXCLUDED.send_receipts,
                 updated_at = NOW()
             RETURNING {SETTINGS_COLUMNS}"
        );
        sqlx::query_as::<_, PaymentSettings>(&sql)
            .bind(seller_id)
            .bind(update.currency)
            .bind(update.payout_email.as_deref())
            .bind(update.statement_descriptor.as_deref())
            .bind(update.send_receipts)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "invalid payment settings"))
    }
}

/// The seller's settings on `conn`, or the defaults.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get(
    conn: &mut PgConnection,
    seller_id: SellerId,
) -> Result<PaymentSettings, RepositoryError> {
    let sql = format!("SELECT {SETTINGS_COLUMNS} FROM desk.payment_settings WHERE seller_id = $1");
    let settings = sqlx::query_as::<_, PaymentSettings>(&sql)
        .bind(seller_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(settings.unwrap_or(PaymentSettings::defaults(seller_id)))
}
