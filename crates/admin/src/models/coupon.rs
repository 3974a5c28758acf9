//! Coupons and their redemptions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use shelfkeeper_core::coupon::{CouponRules, Discount};
use shelfkeeper_core::{
    CouponId, CouponRedemptionId, CustomerId, MembershipId, ProductId, SaleId, SellerId,
};

/// A discount code.
#[derive(Debug, Clone, Serialize)]
pub struct Coupon {
    pub id: CouponId,
    pub seller_id: SellerId,
    /// Normalised (uppercase) code.
    pub code: String,
    pub description: Option<String>,
    pub discount: Discount,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Decimal>,
    pub max_redemptions: Option<i32>,
    pub max_per_customer: Option<i32>,
    pub times_redeemed: i32,
    /// Eligible products; with `membership_ids` empty too, everything is eligible.
    pub product_ids: Vec<ProductId>,
    pub membership_ids: Vec<MembershipId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// The validation rules for this coupon.
    #[must_use]
    pub fn rules(&self) -> CouponRules {
        CouponRules {
            discount: self.discount,
            is_active: self.is_active,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            min_purchase: self.min_purchase,
            max_redemptions: self.max_redemptions,
            max_per_customer: self.max_per_customer,
            product_ids: self.product_ids.clone(),
            membership_ids: self.membership_ids.clone(),
        }
    }
}

/// One use of a coupon.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CouponRedemption {
    pub id: CouponRedemptionId,
    pub coupon_id: CouponId,
    pub customer_id: CustomerId,
    pub sale_id: SaleId,
    pub discount: Decimal,
    pub created_at: DateTime<Utc>,
}
