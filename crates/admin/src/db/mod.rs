//! Database operations for the seller dashboard.
//!
//! # Schema: `desk`
//!
//! Every business table carries a `seller_id` column and every statement in
//! this module filters on it. A row belonging to another seller is
//! indistinguishable from a missing row.
//!
//! Repositories hold a `&PgPool` for single-statement operations. Steps that
//! must share a transaction (recording a sale, redeeming a coupon, switching
//! the default payment method) are free functions taking `&mut PgConnection`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/admin/migrations/` and run via:
//! ```bash
//! cargo run -p shelfkeeper-cli -- migrate
//! ```

pub mod access_records;
pub mod communications;
pub mod coupons;
pub mod customers;
pub mod disputes;
pub mod memberships;
pub mod notifications;
pub mod payment_methods;
pub mod payment_settings;
pub mod products;
pub mod sales;
pub mod sellers;
pub mod stats;
pub mod subscriptions;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use access_records::AccessRecordRepository;
pub use communications::CommunicationRepository;
pub use coupons::CouponRepository;
pub use customers::CustomerRepository;
pub use disputes::DisputeRepository;
pub use memberships::MembershipRepository;
pub use notifications::NotificationRepository;
pub use payment_methods::PaymentMethodRepository;
pub use payment_settings::PaymentSettingsRepository;
pub use products::ProductRepository;
pub use sales::SaleRepository;
pub use sellers::SellerRepository;
pub use stats::StatsRepository;
pub use subscriptions::SubscriptionRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found (or belongs to another seller).
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate email or coupon code).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique, foreign key and check violations to [`RepositoryError::Conflict`].
    pub(crate) fn from_constraint(err: sqlx::Error, message: &str) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                Self::Conflict(message.to_owned())
            }
            _ => Self::Database(err),
        }
    }
}

/// Pagination parameters accepted by list endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Clamp limit and offset into a safe range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            offset: self.offset.max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps() {
        let page = Page {
            limit: 10_000,
            offset: -5,
        }
        .clamped();
        assert_eq!(page.limit, Page::MAX_LIMIT);
        assert_eq!(page.offset, 0);

        assert_eq!(Page { limit: 0, offset: 3 }.clamped().limit, 1);
    }

    #[test]
    fn test_page_defaults_from_empty_query() {
        let page: Page = serde_json::from_str("{}").unwrap_or_default();
        assert_eq!(page.limit, Page::DEFAULT_LIMIT);
        assert_eq!(page.offset, 0);
    }
}
