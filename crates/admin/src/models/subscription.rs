//! Customer subscriptions to memberships.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use shelfkeeper_core::billing::{RenewalInput, Schedule};
use shelfkeeper_core::{
    BillingCycle, CurrencyCode, CustomerId, MembershipId, SellerId, SubscriptionId,
    SubscriptionStatus,
};

/// A customer's subscription to a membership.
///
/// Price, currency and billing cycle are copied from the membership when the
/// subscription starts, so later membership edits do not reprice it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub seller_id: SellerId,
    pub customer_id: CustomerId,
    pub membership_id: MembershipId,
    pub status: SubscriptionStatus,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub billing_cycle: BillingCycle,
    /// Day of month renewals aim for.
    pub anchor_day: i32,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// The billing schedule stored on this row.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        Schedule {
            cycle: self.billing_cycle,
            status: self.status,
            trial_ends_at: self.trial_ends_at,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            anchor_day: u32::try_from(self.anchor_day).unwrap_or(1),
        }
    }

    #[must_use]
    pub const fn renewal_input(&self, has_payment_method: bool) -> RenewalInput {
        RenewalInput {
            status: self.status,
            current_period_end: self.current_period_end,
            cancel_at_period_end: self.cancel_at_period_end,
            has_payment_method,
        }
    }
}
