//! Sale targets and amount arithmetic.
//!
//! A sale is for exactly one thing: a product or a membership. The database
//! stores that as two nullable columns guarded by a `CHECK` constraint; in Rust
//! it is the [`SaleTarget`] enum, so the invalid combinations cannot be built.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::money::round_cents;
use crate::types::{MembershipId, ProductId};

/// What a sale (or coupon check, or access record) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SaleTarget {
    /// A one-off digital product.
    Product(ProductId),
    /// A recurring membership tier.
    Membership(MembershipId),
}

/// Error building a [`SaleTarget`] from its column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SaleTargetError {
    /// Neither column is set.
    #[error("a sale must reference a product or a membership")]
    Missing,
    /// Both columns are set.
    #[error("a sale cannot reference both a product and a membership")]
    Ambiguous,
}

impl SaleTarget {
    /// Build a target from the `(product_id, membership_id)` column pair.
    ///
    /// # Errors
    ///
    /// Returns [`SaleTargetError`] unless exactly one side is `Some`.
    pub const fn from_columns(
        product_id: Option<ProductId>,
        membership_id: Option<MembershipId>,
    ) -> Result<Self, SaleTargetError> {
        match (product_id, membership_id) {
            (Some(product), None) => Ok(Self::Product(product)),
            (None, Some(membership)) => Ok(Self::Membership(membership)),
            (None, None) => Err(SaleTargetError::Missing),
            (Some(_), Some(_)) => Err(SaleTargetError::Ambiguous),
        }
    }

    /// The product column value.
    #[must_use]
    pub const fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::Product(id) => Some(*id),
            Self::Membership(_) => None,
        }
    }

    /// The membership column value.
    #[must_use]
    pub const fn membership_id(&self) -> Option<MembershipId> {
        match self {
            Self::Product(_) => None,
            Self::Membership(id) => Some(*id),
        }
    }
}

/// Subtotal, discount and total of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleAmounts {
    /// List price before discount.
    pub subtotal: Decimal,
    /// Discount actually applied (never more than the subtotal).
    pub discount: Decimal,
    /// Amount charged.
    pub total: Decimal,
}

impl SaleAmounts {
    /// Compute amounts, clamping the discount into `0..=subtotal`.
    #[must_use]
    pub fn new(subtotal: Decimal, discount: Decimal) -> Self {
        let subtotal = round_cents(subtotal.max(Decimal::ZERO));
        let discount = round_cents(discount.max(Decimal::ZERO)).min(subtotal);
        Self {
            subtotal,
            discount,
            total: subtotal - discount,
        }
    }

    /// Amounts with no discount.
    #[must_use]
    pub fn undiscounted(subtotal: Decimal) -> Self {
        Self::new(subtotal, Decimal::ZERO)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns_requires_exactly_one() {
        let product = ProductId::generate();
        let membership = MembershipId::generate();

        assert_eq!(
            SaleTarget::from_columns(Some(product), None),
            Ok(SaleTarget::Product(product))
        );
        assert_eq!(
            SaleTarget::from_columns(None, Some(membership)),
            Ok(SaleTarget::Membership(membership))
        );
        assert_eq!(
            SaleTarget::from_columns(None, None),
            Err(SaleTargetError::Missing)
        );
        assert_eq!(
            SaleTarget::from_columns(Some(product), Some(membership)),
            Err(SaleTargetError::Ambiguous)
        );
    }

    #[test]
    fn test_column_accessors() {
        let product = ProductId::generate();
        let target = SaleTarget::Product(product);
        assert_eq!(target.product_id(), Some(product));
        assert_eq!(target.membership_id(), None);
    }

    #[test]
    fn test_target_json_shape() {
        let id = MembershipId::new(uuid::Uuid::nil());
        let json = serde_json::to_value(SaleTarget::Membership(id)).unwrap();
        assert_eq!(json["kind"], "membership");
        assert_eq!(json["id"], uuid::Uuid::nil().to_string());
    }

    #[test]
    fn test_amounts_clamp_discount() {
        let amounts = SaleAmounts::new(Decimal::new(1000, 2), Decimal::new(2500, 2));
        assert_eq!(amounts.discount, Decimal::new(1000, 2));
        assert_eq!(amounts.total, Decimal::ZERO);

        let amounts = SaleAmounts::new(Decimal::new(1000, 2), Decimal::new(-5, 0));
        assert_eq!(amounts.discount, Decimal::ZERO);
        assert_eq!(amounts.total, Decimal::new(1000, 2));
    }

    #[test]
    fn test_amounts_subtract() {
        let amounts = SaleAmounts::new(Decimal::new(4999, 2), Decimal::new(500, 2));
        assert_eq!(amounts.total, Decimal::new(4499, 2));
    }
}
