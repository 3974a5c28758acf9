//! Stored customer payment methods.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelfkeeper_core::payment_method::DefaultCandidate;
use shelfkeeper_core::{CustomerId, PaymentMethodId, PaymentMethodKind, SellerId};

/// A payment method on file for a customer.
///
/// Only display details are stored; there is no card number or token.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub seller_id: SellerId,
    pub customer_id: CustomerId,
    pub kind: PaymentMethodKind,
    /// Human label, e.g. "Visa ending 4242".
    pub label: String,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentMethod> for DefaultCandidate {
    fn from(pm: &PaymentMethod) -> Self {
        Self {
            id: pm.id,
            exp_month: pm.exp_month,
            exp_year: pm.exp_year,
            created_at: pm.created_at,
        }
    }
}
