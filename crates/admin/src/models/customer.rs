//! Customers of a seller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use shelfkeeper_core::{CustomerId, Email, SellerId};

use super::{AccessRecord, Sale, Subscription};

/// A customer record owned by one seller.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub seller_id: SellerId,
    pub email: Email,
    pub name: Option<String>,
    /// Private seller notes.
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Name if set, otherwise the email address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.email.as_str())
    }
}

/// Everything the seller knows about one customer.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerHistory {
    pub customer: Customer,
    pub sales: Vec<Sale>,
    pub subscriptions: Vec<Subscription>,
    pub access_records: Vec<AccessRecord>,
    /// Sum of completed sale totals.
    pub lifetime_value: Decimal,
}
