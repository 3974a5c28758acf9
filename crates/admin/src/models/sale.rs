//! Sales of products and memberships.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelfkeeper_core::sale::{SaleAmounts, SaleTarget};
use shelfkeeper_core::{
    CouponId, CurrencyCode, CustomerId, PaymentMethodId, SaleId, SaleStatus, SellerId,
    SubscriptionId,
};

/// A completed, pending, refunded or failed sale.
#[derive(Debug, Clone, Serialize)]
pub struct Sale {
    pub id: SaleId,
    pub seller_id: SellerId,
    pub customer_id: CustomerId,
    /// The product or membership sold.
    pub target: SaleTarget,
    /// Set for membership sales created by a subscription.
    pub subscription_id: Option<SubscriptionId>,
    pub coupon_id: Option<CouponId>,
    pub payment_method_id: Option<PaymentMethodId>,
    #[serde(flatten)]
    pub amounts: SaleAmounts,
    pub currency: CurrencyCode,
    pub status: SaleStatus,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
