//! Seller accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelfkeeper_core::{Email, SellerId};

/// A seller who owns a store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Seller {
    pub id: SellerId,
    pub email: Email,
    /// Name shown in the dashboard header.
    pub display_name: String,
    /// Store name used in customer communications.
    pub store_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
