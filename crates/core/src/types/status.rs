//! Status and kind enums for dashboard entities.
//!
//! Each enum maps to a `PostgreSQL` enum type in the `desk` schema and
//! serializes as `snake_case`. `Display`/`FromStr` use the same names so
//! query strings, JSON bodies and database values all agree.

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Defines a `snake_case` enum with `as_str`, `Display`, `FromStr` and `ALL`.
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal, $pg:tt) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "postgres", derive(sqlx::Type))]
        #[cfg_attr(feature = "postgres", sqlx(type_name = $pg, rename_all = "snake_case"))]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The `snake_case` name used in JSON and the database.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseStatusError {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

named_enum! {
    /// Publication state of a product.
    ProductStatus("product status", "desk.product_status") {
        /// Being edited, not purchasable.
        Draft => "draft",
        /// Visible and purchasable.
        Published => "published",
        /// Retired; existing purchases keep access.
        Archived => "archived",
    }
}

named_enum! {
    /// How often a membership bills.
    BillingCycle("billing cycle", "desk.billing_cycle") {
        Weekly => "weekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

named_enum! {
    /// Lifecycle of a sale.
    SaleStatus("sale status", "desk.sale_status") {
        Pending => "pending",
        Completed => "completed",
        Refunded => "refunded",
        Failed => "failed",
    }
}

named_enum! {
    /// Lifecycle of a customer's membership subscription.
    SubscriptionStatus("subscription status", "desk.subscription_status") {
        Trialing => "trialing",
        Active => "active",
        PastDue => "past_due",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

impl SubscriptionStatus {
    /// Whether the subscription still counts as live (grants access, bills).
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Trialing | Self::Active)
    }
}

named_enum! {
    /// How a coupon's value is interpreted.
    DiscountType("discount type", "desk.discount_type") {
        /// `discount_value` is a percentage of the subtotal.
        Percentage => "percentage",
        /// `discount_value` is an amount in the sale currency.
        FixedAmount => "fixed_amount",
    }
}

named_enum! {
    /// Lifecycle of a payment dispute.
    DisputeStatus("dispute status", "desk.dispute_status") {
        Open => "open",
        UnderReview => "under_review",
        Won => "won",
        Lost => "lost",
        Closed => "closed",
    }
}

named_enum! {
    /// Kind of access a customer made to a product or membership asset.
    AccessType("access type", "desk.access_type") {
        View => "view",
        Download => "download",
        Stream => "stream",
    }
}

named_enum! {
    /// Kind of stored customer payment method.
    PaymentMethodKind("payment method kind", "desk.payment_method_kind") {
        Card => "card",
        Paypal => "paypal",
        BankAccount => "bank_account",
    }
}

named_enum! {
    /// Delivery state of a customer communication.
    CommunicationStatus("communication status", "desk.communication_status") {
        /// Recorded but not yet delivered (no SMTP configured, or awaiting flush).
        Queued => "queued",
        Sent => "sent",
        Failed => "failed",
    }
}

named_enum! {
    /// What triggered a seller notification.
    NotificationKind("notification kind", "desk.notification_kind") {
        NewSale => "new_sale",
        SaleRefunded => "sale_refunded",
        DisputeOpened => "dispute_opened",
        DisputeResolved => "dispute_resolved",
        SubscriptionStarted => "subscription_started",
        SubscriptionCancelled => "subscription_cancelled",
        SubscriptionPastDue => "subscription_past_due",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        for status in SubscriptionStatus::ALL {
            let parsed: SubscriptionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, *status);
        }
        for kind in NotificationKind::ALL {
            let parsed: NotificationKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&DisputeStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
        let parsed: PaymentMethodKind = serde_json::from_str("\"bank_account\"").unwrap();
        assert_eq!(parsed, PaymentMethodKind::BankAccount);
    }

    #[test]
    fn test_parse_error_names_the_enum() {
        let err = "sometimes".parse::<BillingCycle>().unwrap_err();
        assert_eq!(err.to_string(), "invalid billing cycle: sometimes");
    }

    #[test]
    fn test_live_subscription_statuses() {
        assert!(SubscriptionStatus::Trialing.is_live());
        assert!(SubscriptionStatus::Active.is_live());
        assert!(!SubscriptionStatus::PastDue.is_live());
        assert!(!SubscriptionStatus::Cancelled.is_live());
        assert!(!SubscriptionStatus::Expired.is_live());
    }
}
