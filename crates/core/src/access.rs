//! Access checks for product files and membership content.
//!
//! Every access a customer makes is recorded, but only downloads count
//! against a product's download limit. Views and streams still need a valid
//! entitlement inside the access window.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::types::{AccessType, SubscriptionStatus};

/// Limits configured on a product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Maximum number of downloads per customer, `None` for unlimited.
    pub download_limit: Option<i32>,
    /// Days after purchase during which the product may be accessed.
    pub access_days: Option<i32>,
}

/// What gives a customer the right to access something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    /// A completed sale of the product.
    Purchase { purchased_at: DateTime<Utc> },
    /// A subscription to the membership.
    Subscription {
        status: SubscriptionStatus,
        current_period_end: DateTime<Utc>,
    },
    /// Nothing found.
    None,
}

/// Access allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    /// Downloads left after this one, `None` when unlimited.
    pub remaining_downloads: Option<i64>,
}

/// Access refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AccessDenial {
    #[error("customer has not purchased this item")]
    NotEntitled,
    #[error("the access window for this purchase has closed")]
    AccessWindowClosed,
    #[error("download limit of {limit} reached")]
    DownloadLimitReached { limit: i32 },
    #[error("subscription is not active")]
    SubscriptionInactive,
}

/// Decide whether an access of `access_type` is allowed.
///
/// `prior_downloads` is the number of downloads already recorded for this
/// customer and item.
///
/// # Errors
///
/// Returns the [`AccessDenial`] explaining why access is refused.
pub fn check_access(
    policy: &AccessPolicy,
    entitlement: &Entitlement,
    access_type: AccessType,
    prior_downloads: i64,
    now: DateTime<Utc>,
) -> Result<AccessGrant, AccessDenial> {
    match entitlement {
        Entitlement::None => return Err(AccessDenial::NotEntitled),
        Entitlement::Purchase { purchased_at } => {
            if let Some(days) = policy.access_days
                && now >= *purchased_at + Duration::days(i64::from(days))
            {
                return Err(AccessDenial::AccessWindowClosed);
            }
        }
        Entitlement::Subscription {
            status,
            current_period_end,
        } => {
            if !status.is_live() || now >= *current_period_end {
                return Err(AccessDenial::SubscriptionInactive);
            }
        }
    }

    let Some(limit) = policy.download_limit else {
        return Ok(AccessGrant {
            remaining_downloads: None,
        });
    };

    let limit_wide = i64::from(limit);
    if access_type != AccessType::Download {
        return Ok(AccessGrant {
            remaining_downloads: Some((limit_wide - prior_downloads).max(0)),
        });
    }

    if prior_downloads >= limit_wide {
        return Err(AccessDenial::DownloadLimitReached { limit });
    }

    Ok(AccessGrant {
        remaining_downloads: Some(limit_wide - prior_downloads - 1),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
    }

    fn purchased(days_ago: i64) -> Entitlement {
        Entitlement::Purchase {
            purchased_at: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_no_entitlement() {
        let result = check_access(
            &AccessPolicy::default(),
            &Entitlement::None,
            AccessType::View,
            0,
            now(),
        );
        assert_eq!(result, Err(AccessDenial::NotEntitled));
    }

    #[test]
    fn test_unlimited_downloads() {
        let grant = check_access(
            &AccessPolicy::default(),
            &purchased(400),
            AccessType::Download,
            1_000,
            now(),
        )
        .unwrap();
        assert_eq!(grant.remaining_downloads, None);
    }

    #[test]
    fn test_download_limit_counts_only_downloads() {
        let policy = AccessPolicy {
            download_limit: Some(3),
            access_days: None,
        };

        let grant = check_access(&policy, &purchased(1), AccessType::Download, 2, now()).unwrap();
        assert_eq!(grant.remaining_downloads, Some(0));

        assert_eq!(
            check_access(&policy, &purchased(1), AccessType::Download, 3, now()),
            Err(AccessDenial::DownloadLimitReached { limit: 3 })
        );

        // Streaming after the limit is still allowed.
        let grant = check_access(&policy, &purchased(1), AccessType::Stream, 3, now()).unwrap();
        assert_eq!(grant.remaining_downloads, Some(0));
    }

    #[test]
    fn test_access_window() {
        let policy = AccessPolicy {
            download_limit: None,
            access_days: Some(30),
        };
        assert!(check_access(&policy, &purchased(29), AccessType::View, 0, now()).is_ok());
        assert_eq!(
            check_access(&policy, &purchased(30), AccessType::View, 0, now()),
            Err(AccessDenial::AccessWindowClosed)
        );
    }

    #[test]
    fn test_subscription_entitlement() {
        let policy = AccessPolicy::default();
        let live = Entitlement::Subscription {
            status: SubscriptionStatus::Active,
            current_period_end: now() + Duration::days(3),
        };
        assert!(check_access(&policy, &live, AccessType::Stream, 0, now()).is_ok());

        let lapsed = Entitlement::Subscription {
            status: SubscriptionStatus::Active,
            current_period_end: now() - Duration::seconds(1),
        };
        assert_eq!(
            check_access(&policy, &lapsed, AccessType::Stream, 0, now()),
            Err(AccessDenial::SubscriptionInactive)
        );

        let past_due = Entitlement::Subscription {
            status: SubscriptionStatus::PastDue,
            current_period_end: now() + Duration::days(3),
        };
        assert_eq!(
            check_access(&policy, &past_due, AccessType::View, 0, now()),
            Err(AccessDenial::SubscriptionInactive)
        );
    }
}
