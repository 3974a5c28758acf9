//! Coupon management and previews.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use shelfkeeper_core::coupon::{
    CouponCodeError, CouponRejection, Discount, DiscountError, GENERATED_CODE_LENGTH,
    RedemptionContext, generate_code, normalize_code,
};
use shelfkeeper_core::sale::{SaleTarget, SaleTargetError};
use shelfkeeper_core::{
    CouponId, CustomerId, DiscountType, MembershipId, ProductId, SellerId,
};

use crate::db::coupons::{CouponChanges, NewCoupon};
use crate::db::{CouponRepository, RepositoryError, coupons, customers};
use crate::models::Coupon;
use crate::services::sales::{SaleError, not_found, price_target};

/// Attempts at finding an unused generated code.
const GENERATE_ATTEMPTS: usize = 5;

/// Errors managing or previewing coupons.
#[derive(Debug, Error)]
pub enum CouponError {
    #[error("coupon not found")]
    CouponNotFound,

    #[error("customer not found")]
    CustomerNotFound,

    #[error("invalid coupon code: {0}")]
    InvalidCode(#[from] CouponCodeError),

    #[error("invalid discount: {0}")]
    InvalidDiscount(#[from] DiscountError),

    #[error("coupon must start before it expires")]
    InvalidWindow,

    #[error("{0} must be greater than zero")]
    InvalidLimit(&'static str),

    #[error("minimum purchase must not be negative")]
    NegativeMinimum,

    #[error("{0}")]
    InvalidTarget(#[from] SaleTargetError),

    #[error("{0}")]
    Target(SaleError),

    #[error("could not generate an unused coupon code")]
    CodeSpaceExhausted,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<SaleError> for CouponError {
    fn from(err: SaleError) -> Self {
        match err {
            SaleError::Repository(e) => Self::Repository(e),
            other => Self::Target(other),
        }
    }
}

/// A coupon as submitted by the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponInput {
    /// Generated when absent.
    pub code: Option<String>,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Decimal>,
    pub max_redemptions: Option<i32>,
    pub max_per_customer: Option<i32>,
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
    #[serde(default)]
    pub membership_ids: Vec<MembershipId>,
}

const fn default_active() -> bool {
    true
}

/// A partial coupon update. A field sent as `null` is cleared; a field left
/// out is unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CouponPatch {
    pub code: Option<String>,
    pub description: Option<String>,
    /// Must be sent together with `discount_value`.
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub min_purchase: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_redemptions: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_per_customer: Option<Option<i32>>,
    pub product_ids: Option<Vec<ProductId>>,
    pub membership_ids: Option<Vec<MembershipId>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Request to check a code without redeeming it.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRequest {
    pub code: String,
    pub customer_id: CustomerId,
    pub product_id: Option<ProductId>,
    pub membership_id: Option<MembershipId>,
}

/// What a coupon would do for a purchase.
#[derive(Debug, Clone, Serialize)]
pub struct CouponPreview {
    pub coupon_id: CouponId,
    pub code: String,
    pub valid: bool,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    /// Why the coupon would be refused, when it would be.
    pub rejection: Option<CouponRejection>,
}

/// Coupon service.
pub struct CouponService<'a> {
    pool: &'a PgPool,
    coupons: CouponRepository<'a>,
}

impl<'a> CouponService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            coupons: CouponRepository::new(pool),
        }
    }

    /// Validate and create a coupon.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or a repository conflict if the code is
    /// already used by this seller.
    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        seller_id: SellerId,
        input: &CouponInput,
    ) -> Result<Coupon, CouponError> {
        let code = match input.code.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(code) => normalize_code(code)?,
            None => self.unused_code(seller_id).await?,
        };
        let new = NewCoupon {
            code,
            description: input.description.clone(),
            discount: Discount::new(input.discount_type, input.discount_value)?,
            is_active: input.is_active,
            starts_at: input.starts_at,
            expires_at: input.expires_at,
            min_purchase: input.min_purchase,
            max_redemptions: input.max_redemptions,
            max_per_customer: input.max_per_customer,
            product_ids: input.product_ids.clone(),
            membership_ids: input.membership_ids.clone(),
        };
        check_limits(new.starts_at, new.expires_at, new.min_purchase, new.max_redemptions, new.max_per_customer)?;

        let coupon = self.coupons.create(seller_id, &new).await?;
        tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");
        Ok(coupon)
    }

    /// Validate and apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::CouponNotFound`, a validation error for the
    /// coupon as it would be after the update, or a repository conflict.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        seller_id: SellerId,
        id: CouponId,
        patch: &CouponPatch,
    ) -> Result<Coupon, CouponError> {
        let current = self
            .coupons
            .get(seller_id, id)
            .await
            .map_err(|e| not_found(e, CouponError::CouponNotFound))?;
        let changes = merge_patch(&current, patch)?;

        self.coupons
            .update(seller_id, id, &changes)
            .await
            .map_err(|e| not_found(e, CouponError::CouponNotFound))
    }

    /// Check a code against a customer and target without redeeming it.
    ///
    /// An unknown code is an error; a known code that would be refused is a
    /// preview with `valid: false` and the reason.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::CouponNotFound`, `CouponError::CustomerNotFound`
    /// or the error for an unsellable target.
    #[instrument(skip(self, request))]
    pub async fn preview(
        &self,
        seller_id: SellerId,
        request: &PreviewRequest,
        now: DateTime<Utc>,
    ) -> Result<CouponPreview, CouponError> {
        let code = normalize_code(&request.code)?;
        let target = SaleTarget::from_columns(request.product_id, request.membership_id)?;

        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let customer = customers::get(&mut conn, seller_id, request.customer_id, false)
            .await
            .map_err(|e| not_found(e, CouponError::CustomerNotFound))?;
        let priced = price_target(&mut conn, seller_id, target).await?;
        let coupon = self
            .coupons
            .get_by_code(seller_id, &code)
            .await
            .map_err(|e| not_found(e, CouponError::CouponNotFound))?;
        let customer_redemptions =
            coupons::customer_redemption_count(&mut conn, seller_id, coupon.id, customer.id)
                .await?;

        let outcome = coupon.rules().evaluate(&RedemptionContext {
            now,
            target,
            subtotal: priced.price,
            times_redeemed: i64::from(coupon.times_redeemed),
            customer_redemptions,
        });
        Ok(preview(&coupon, priced.price, outcome))
    }

    /// A random code not yet used by this seller.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::CodeSpaceExhausted` if every attempt collided.
    pub async fn unused_code(&self, seller_id: SellerId) -> Result<String, CouponError> {
        for _ in 0..GENERATE_ATTEMPTS {
            let code = generate_code(GENERATED_CODE_LENGTH);
            match self.coupons.get_by_code(seller_id, &code).await {
                Err(RepositoryError::NotFound) => return Ok(code),
                Ok(_) => tracing::debug!(%code, "Generated coupon code already taken"),
                Err(e) => return Err(e.into()),
            }
        }
        Err(CouponError::CodeSpaceExhausted)
    }
}

fn preview(
    coupon: &Coupon,
    subtotal: Decimal,
    outcome: Result<Decimal, CouponRejection>,
) -> CouponPreview {
    let (discount, rejection) = match outcome {
        Ok(discount) => (discount, None),
        Err(rejection) => (Decimal::ZERO, Some(rejection)),
    };
    CouponPreview {
        coupon_id: coupon.id,
        code: coupon.code.clone(),
        valid: rejection.is_none(),
        subtotal,
        discount,
        total: subtotal - discount,
        rejection,
    }
}

/// Turn a patch into repository changes, validating the merged result.
fn merge_patch(current: &Coupon, patch: &CouponPatch) -> Result<CouponChanges, CouponError> {
    let discount = match (patch.discount_type, patch.discount_value) {
        (None, None) => None,
        (Some(kind), Some(value)) => Some(Discount::new(kind, value)?),
        (Some(kind), None) => Some(Discount::new(kind, current.discount.value())?),
        (None, Some(value)) => Some(Discount::new(current.discount.discount_type(), value)?),
    };

    check_limits(
        patch.starts_at.unwrap_or(current.starts_at),
        patch.expires_at.unwrap_or(current.expires_at),
        patch.min_purchase.unwrap_or(current.min_purchase),
        patch.max_redemptions.unwrap_or(current.max_redemptions),
        patch.max_per_customer.unwrap_or(current.max_per_customer),
    )?;

    let eligibility = if patch.product_ids.is_some() || patch.membership_ids.is_some() {
        Some((
            patch
                .product_ids
                .clone()
                .unwrap_or_else(|| current.product_ids.clone()),
            patch
                .membership_ids
                .clone()
                .unwrap_or_else(|| current.membership_ids.clone()),
        ))
    } else {
        None
    };

    Ok(CouponChanges {
        code: patch.code.as_deref().map(normalize_code).transpose()?,
        description: patch.description.clone(),
        discount,
        starts_at: patch.starts_at,
        expires_at: patch.expires_at,
        min_purchase: patch.min_purchase,
        max_redemptions: patch.max_redemptions,
        max_per_customer: patch.max_per_customer,
        eligibility,
    })
}

fn check_limits(
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    min_purchase: Option<Decimal>,
    max_redemptions: Option<i32>,
    max_per_customer: Option<i32>,
) -> Result<(), CouponError> {
    if let (Some(start), Some(end)) = (starts_at, expires_at)
        && start >= end
    {
        return Err(CouponError::InvalidWindow);
    }
    if min_purchase.is_some_and(|m| m < Decimal::ZERO) {
        return Err(CouponError::NegativeMinimum);
    }
    if max_redemptions.is_some_and(|m| m <= 0) {
        return Err(CouponError::InvalidLimit("max_redemptions"));
    }
    if max_per_customer.is_some_and(|m| m <= 0) {
        return Err(CouponError::InvalidLimit("max_per_customer"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn coupon() -> Coupon {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        Coupon {
            id: CouponId::generate(),
            seller_id: SellerId::generate(),
            code: "SPRING25".to_string(),
            description: None,
            discount: Discount::new(DiscountType::Percentage, Decimal::new(25, 0)).unwrap(),
            is_active: true,
            starts_at: Some(at),
            expires_at: Some(at + Duration::days(30)),
            min_purchase: None,
            max_redemptions: Some(100),
            max_per_customer: None,
            times_redeemed: 0,
            product_ids: Vec::new(),
            membership_ids: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_check_limits() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(check_limits(Some(start), Some(start + Duration::days(1)), None, None, None).is_ok());
        assert!(matches!(
            check_limits(Some(start), Some(start), None, None, None),
            Err(CouponError::InvalidWindow)
        ));
        assert!(matches!(
            check_limits(None, None, Some(Decimal::NEGATIVE_ONE), None, None),
            Err(CouponError::NegativeMinimum)
        ));
        assert!(matches!(
            check_limits(None, None, None, Some(0), None),
            Err(CouponError::InvalidLimit("max_redemptions"))
        ));
        assert!(matches!(
            check_limits(None, None, None, None, Some(-1)),
            Err(CouponError::InvalidLimit("max_per_customer"))
        ));
    }

    #[test]
    fn test_merge_patch_checks_merged_window() {
        let current = coupon();
        // Moving the start past the stored expiry is rejected.
        let patch = CouponPatch {
            starts_at: Some(current.expires_at.map(|e| e + Duration::days(1))),
            ..CouponPatch::default()
        };
        assert!(matches!(
            merge_patch(&current, &patch),
            Err(CouponError::InvalidWindow)
        ));

        // Clearing the expiry makes any start valid.
        let patch = CouponPatch {
            starts_at: Some(current.expires_at.map(|e| e + Duration::days(1))),
            expires_at: Some(None),
            ..CouponPatch::default()
        };
        let changes = merge_patch(&current, &patch).unwrap();
        assert_eq!(changes.expires_at, Some(None));
    }

    #[test]
    fn test_merge_patch_discount_keeps_missing_half() {
        let current = coupon();
        let patch = CouponPatch {
            discount_value: Some(Decimal::new(10, 0)),
            ..CouponPatch::default()
        };
        let changes = merge_patch(&current, &patch).unwrap();
        assert_eq!(changes.discount, Some(Discount::Percentage(Decimal::new(10, 0))));

        let patch = CouponPatch {
            discount_value: Some(Decimal::new(150, 0)),
            ..CouponPatch::default()
        };
        assert!(matches!(
            merge_patch(&current, &patch),
            Err(CouponError::InvalidDiscount(DiscountError::PercentageOutOfRange))
        ));
    }

    #[test]
    fn test_merge_patch_normalises_code() {
        let patch = CouponPatch {
            code: Some(" summer10 ".to_string()),
            ..CouponPatch::default()
        };
        let changes = merge_patch(&coupon(), &patch).unwrap();
        assert_eq!(changes.code.as_deref(), Some("SUMMER10"));
        assert!(changes.eligibility.is_none());
    }

    #[test]
    fn test_patch_distinguishes_null_from_missing() {
        let patch: CouponPatch =
            serde_json::from_value(serde_json::json!({ "expires_at": null })).unwrap();
        assert_eq!(patch.expires_at, Some(None));
        assert_eq!(patch.starts_at, None);
    }

    #[test]
    fn test_preview_reports_rejection() {
        let coupon = coupon();
        let rejected = preview(&coupon, Decimal::new(2000, 2), Err(CouponRejection::Expired));
        assert!(!rejected.valid);
        assert_eq!(rejected.discount, Decimal::ZERO);
        assert_eq!(rejected.total, Decimal::new(2000, 2));

        let accepted = preview(&coupon, Decimal::new(2000, 2), Ok(Decimal::new(500, 2)));
        assert!(accepted.valid);
        assert_eq!(accepted.total, Decimal::new(1500, 2));
        assert!(accepted.rejection.is_none());
    }

    #[test]
    fn test_input_defaults_to_active() {
        let input: CouponInput = serde_json::from_value(serde_json::json!({
            "discount_type": "fixed_amount",
            "discount_value": "5.00",
        }))
        .unwrap();
        assert!(input.is_active);
        assert!(input.code.is_none());
        assert!(input.product_ids.is_empty());
    }
}
