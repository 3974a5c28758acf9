//! Per-seller payment settings.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelfkeeper_core::{CurrencyCode, SellerId};

/// Payment settings. Sellers without a saved row get [`PaymentSettings::defaults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PaymentSettings {
    pub seller_id: SellerId,
    /// Currency for new products and memberships.
    pub currency: CurrencyCode,
    pub payout_email: Option<String>,
    /// Text on the customer's statement, at most 22 characters.
    pub statement_descriptor: Option<String>,
    /// Queue a receipt to the customer for every completed sale.
    pub send_receipts: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentSettings {
    /// Maximum statement descriptor length.
    pub const MAX_DESCRIPTOR_LENGTH: usize = 22;

    /// Settings used before the seller saves any.
    #[must_use]
    pub const fn defaults(seller_id: SellerId) -> Self {
        Self {
            seller_id,
            currency: CurrencyCode::USD,
            payout_email: None,
            statement_descriptor: None,
            send_receipts: true,
            updated_at: None,
        }
    }
}
