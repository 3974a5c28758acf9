//! Recurring membership tiers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use shelfkeeper_core::billing::monthly_equivalent;
use shelfkeeper_core::{BillingCycle, CurrencyCode, MembershipId, SellerId};

/// A membership customers subscribe to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Membership {
    pub id: MembershipId,
    pub seller_id: SellerId,
    pub name: String,
    pub description: Option<String>,
    /// Price per billing cycle.
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub billing_cycle: BillingCycle,
    pub trial_days: i32,
    /// Inactive memberships accept no new subscriptions.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Price normalised to one month.
    #[must_use]
    pub fn monthly_price(&self) -> Decimal {
        monthly_equivalent(self.price, self.billing_cycle)
    }
}
