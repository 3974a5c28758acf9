//! Coupon codes, discounts and validation.
//!
//! [`CouponRules::evaluate`] is the single place that decides whether a coupon
//! may be redeemed against a sale. The admin crate loads the rules and the
//! redemption counters inside a locked transaction and calls it before
//! inserting the sale, so the counters it sees are the ones it increments.

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sale::SaleTarget;
use crate::types::money::round_cents;
use crate::types::{DiscountType, MembershipId, ProductId};

/// Shortest accepted coupon code.
pub const MIN_CODE_LENGTH: usize = 3;
/// Longest accepted coupon code.
pub const MAX_CODE_LENGTH: usize = 32;
/// Length of generated codes.
pub const GENERATED_CODE_LENGTH: usize = 8;

/// Characters used for generated codes (no 0/O or 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Errors from [`normalize_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponCodeError {
    #[error("coupon code must be at least {MIN_CODE_LENGTH} characters")]
    TooShort,
    #[error("coupon code must be at most {MAX_CODE_LENGTH} characters")]
    TooLong,
    #[error("coupon code contains invalid character '{0}'")]
    InvalidCharacter(char),
}

/// Trim and uppercase a code, then check its length and alphabet.
///
/// # Errors
///
/// Returns [`CouponCodeError`] if the code is too short, too long, or uses
/// characters other than `A-Z`, `0-9`, `-` and `_`.
pub fn normalize_code(raw: &str) -> Result<String, CouponCodeError> {
    let code = raw.trim().to_ascii_uppercase();
    if let Some(bad) = code
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(CouponCodeError::InvalidCharacter(bad));
    }
    match code.len() {
        n if n < MIN_CODE_LENGTH => Err(CouponCodeError::TooShort),
        n if n > MAX_CODE_LENGTH => Err(CouponCodeError::TooLong),
        _ => Ok(code),
    }
}

/// Generate a random code of `len` characters from an unambiguous alphabet.
#[must_use]
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .filter_map(|_| CODE_ALPHABET.choose(&mut rng).copied().map(char::from))
        .collect()
}

/// Errors from [`Discount::new`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    #[error("percentage discounts must be greater than 0 and at most 100")]
    PercentageOutOfRange,
    #[error("fixed discounts must be greater than 0")]
    NonPositiveAmount,
}

/// A validated discount value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage of the subtotal, in `(0, 100]`.
    Percentage(Decimal),
    /// Fixed amount off, greater than zero.
    FixedAmount(Decimal),
}

impl Discount {
    /// Build a discount from its stored type/value pair.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError`] if the value is out of range for its type.
    pub fn new(discount_type: DiscountType, value: Decimal) -> Result<Self, DiscountError> {
        match discount_type {
            DiscountType::Percentage => {
                if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                    return Err(DiscountError::PercentageOutOfRange);
                }
                Ok(Self::Percentage(value))
            }
            DiscountType::FixedAmount => {
                if value <= Decimal::ZERO {
                    return Err(DiscountError::NonPositiveAmount);
                }
                Ok(Self::FixedAmount(value))
            }
        }
    }

    /// The stored type.
    #[must_use]
    pub const fn discount_type(&self) -> DiscountType {
        match self {
            Self::Percentage(_) => DiscountType::Percentage,
            Self::FixedAmount(_) => DiscountType::FixedAmount,
        }
    }

    /// The stored value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        match self {
            Self::Percentage(v) | Self::FixedAmount(v) => *v,
        }
    }

    /// Amount taken off `subtotal`, rounded to cents and never above it.
    #[must_use]
    pub fn amount_off(&self, subtotal: Decimal) -> Decimal {
        if subtotal <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw = match self {
            Self::Percentage(pct) => subtotal * *pct / Decimal::ONE_HUNDRED,
            Self::FixedAmount(amount) => *amount,
        };
        round_cents(raw).min(subtotal)
    }
}

/// Why a coupon cannot be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon has reached its redemption limit")]
    Exhausted,
    #[error("customer has already used this coupon the maximum number of times")]
    CustomerLimitReached,
    #[error("coupon does not apply to this item")]
    NotApplicable,
    #[error("purchase is below the coupon minimum of {minimum}")]
    BelowMinimum {
        /// Minimum subtotal required.
        minimum: Decimal,
    },
}

/// Everything a coupon row says about when it may be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponRules {
    pub discount: Discount,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Decimal>,
    pub max_redemptions: Option<i32>,
    pub max_per_customer: Option<i32>,
    /// Eligible products. Both lists empty means the coupon applies to everything.
    pub product_ids: Vec<ProductId>,
    /// Eligible memberships.
    pub membership_ids: Vec<MembershipId>,
}

/// The sale a coupon is being checked against.
#[derive(Debug, Clone, Copy)]
pub struct RedemptionContext {
    pub now: DateTime<Utc>,
    pub target: SaleTarget,
    pub subtotal: Decimal,
    /// Redemptions of this coupon across all customers.
    pub times_redeemed: i64,
    /// Redemptions of this coupon by the purchasing customer.
    pub customer_redemptions: i64,
}

impl CouponRules {
    /// Whether the coupon's eligibility lists cover `target`.
    #[must_use]
    pub fn applies_to(&self, target: &SaleTarget) -> bool {
        if self.product_ids.is_empty() && self.membership_ids.is_empty() {
            return true;
        }
        match target {
            SaleTarget::Product(id) => self.product_ids.contains(id),
            SaleTarget::Membership(id) => self.membership_ids.contains(id),
        }
    }

    /// Check every rule and return the discount amount.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`CouponRejection`], checked in the order:
    /// active, started, expired, global limit, per-customer limit,
    /// eligibility, minimum purchase.
    pub fn evaluate(&self, ctx: &RedemptionContext) -> Result<Decimal, CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if self.starts_at.is_some_and(|starts| ctx.now < starts) {
            return Err(CouponRejection::NotStarted);
        }
        if self.expires_at.is_some_and(|expires| ctx.now >= expires) {
            return Err(CouponRejection::Expired);
        }
        if self
            .max_redemptions
            .is_some_and(|max| ctx.times_redeemed >= i64::from(max))
        {
            return Err(CouponRejection::Exhausted);
        }
        if self
            .max_per_customer
            .is_some_and(|max| ctx.customer_redemptions >= i64::from(max))
        {
            return Err(CouponRejection::CustomerLimitReached);
        }
        if !self.applies_to(&ctx.target) {
            return Err(CouponRejection::NotApplicable);
        }
        if let Some(minimum) = self.min_purchase
            && ctx.subtotal < minimum
        {
            return Err(CouponRejection::BelowMinimum { minimum });
        }

        Ok(self.discount.amount_off(ctx.subtotal))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    fn rules(discount: Discount) -> CouponRules {
        CouponRules {
            discount,
            is_active: true,
            starts_at: None,
            expires_at: None,
            min_purchase: None,
            max_redemptions: None,
            max_per_customer: None,
            product_ids: vec![],
            membership_ids: vec![],
        }
    }

    fn ctx(target: SaleTarget, subtotal: Decimal) -> RedemptionContext {
        RedemptionContext {
            now: now(),
            target,
            subtotal,
            times_redeemed: 0,
            customer_redemptions: 0,
        }
    }

    fn dollars(d: i64) -> Decimal {
        Decimal::from(d)
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  summer-25 ").unwrap(), "SUMMER-25");
        assert_eq!(normalize_code("ab"), Err(CouponCodeError::TooShort));
        assert_eq!(
            normalize_code(&"A".repeat(33)),
            Err(CouponCodeError::TooLong)
        );
        assert_eq!(
            normalize_code("SAVE 10"),
            Err(CouponCodeError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_generated_codes_are_valid() {
        let code = generate_code(GENERATED_CODE_LENGTH);
        assert_eq!(code.len(), GENERATED_CODE_LENGTH);
        assert_eq!(normalize_code(&code).unwrap(), code);
        assert!(!code.contains('O') && !code.contains('0'));
    }

    #[test]
    fn test_discount_validation() {
        assert!(Discount::new(DiscountType::Percentage, dollars(0)).is_err());
        assert!(Discount::new(DiscountType::Percentage, dollars(101)).is_err());
        assert!(Discount::new(DiscountType::Percentage, dollars(100)).is_ok());
        assert_eq!(
            Discount::new(DiscountType::FixedAmount, dollars(-1)),
            Err(DiscountError::NonPositiveAmount)
        );
    }

    #[test]
    fn test_percentage_rounds_to_cents() {
        let discount = Discount::Percentage(Decimal::new(15, 0));
        // 15% of 9.99 = 1.4985 -> 1.50
        assert_eq!(
            discount.amount_off(Decimal::new(999, 2)),
            Decimal::new(150, 2)
        );
    }

    #[test]
    fn test_fixed_amount_clamped_to_subtotal() {
        let discount = Discount::FixedAmount(dollars(50));
        assert_eq!(discount.amount_off(dollars(20)), dollars(20));
        assert_eq!(discount.amount_off(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_evaluate_happy_path() {
        let product = ProductId::generate();
        let result = rules(Discount::Percentage(dollars(10)))
            .evaluate(&ctx(SaleTarget::Product(product), dollars(40)));
        assert_eq!(result, Ok(dollars(4)));
    }

    #[test]
    fn test_evaluate_window() {
        let target = SaleTarget::Product(ProductId::generate());
        let mut coupon = rules(Discount::FixedAmount(dollars(5)));

        coupon.starts_at = Some(now() + Duration::hours(1));
        assert_eq!(
            coupon.evaluate(&ctx(target, dollars(10))),
            Err(CouponRejection::NotStarted)
        );

        coupon.starts_at = None;
        coupon.expires_at = Some(now());
        assert_eq!(
            coupon.evaluate(&ctx(target, dollars(10))),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn test_evaluate_limits() {
        let target = SaleTarget::Product(ProductId::generate());
        let mut coupon = rules(Discount::FixedAmount(dollars(5)));
        coupon.max_redemptions = Some(3);
        coupon.max_per_customer = Some(1);

        let mut context = ctx(target, dollars(10));
        context.times_redeemed = 3;
        assert_eq!(coupon.evaluate(&context), Err(CouponRejection::Exhausted));

        context.times_redeemed = 2;
        context.customer_redemptions = 1;
        assert_eq!(
            coupon.evaluate(&context),
            Err(CouponRejection::CustomerLimitReached)
        );

        context.customer_redemptions = 0;
        assert_eq!(coupon.evaluate(&context), Ok(dollars(5)));
    }

    #[test]
    fn test_evaluate_eligibility() {
        let eligible = ProductId::generate();
        let other = ProductId::generate();
        let membership = MembershipId::generate();

        let mut coupon = rules(Discount::Percentage(dollars(50)));
        coupon.product_ids = vec![eligible];

        assert!(coupon.applies_to(&SaleTarget::Product(eligible)));
        assert!(!coupon.applies_to(&SaleTarget::Product(other)));
        assert!(!coupon.applies_to(&SaleTarget::Membership(membership)));
        assert_eq!(
            coupon.evaluate(&ctx(SaleTarget::Product(other), dollars(10))),
            Err(CouponRejection::NotApplicable)
        );
    }

    #[test]
    fn test_evaluate_minimum_and_inactive_order() {
        let target = SaleTarget::Membership(MembershipId::generate());
        let mut coupon = rules(Discount::FixedAmount(dollars(5)));
        coupon.min_purchase = Some(dollars(25));

        assert_eq!(
            coupon.evaluate(&ctx(target, dollars(20))),
            Err(CouponRejection::BelowMinimum {
                minimum: dollars(25)
            })
        );

        coupon.is_active = false;
        assert_eq!(
            coupon.evaluate(&ctx(target, dollars(20))),
            Err(CouponRejection::Inactive)
        );
    }
}
