//! Stored payment method rules.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::types::PaymentMethodId;

/// Whether a card expiring at `exp_month/exp_year` has expired on `today`.
///
/// Cards are valid through the last day of their expiry month. Methods
/// without an expiry (`PayPal`, bank accounts) pass `None` and never expire.
#[must_use]
pub fn is_expired(exp_month: Option<i32>, exp_year: Option<i32>, today: NaiveDate) -> bool {
    let (Some(month), Some(year)) = (exp_month, exp_year) else {
        return false;
    };
    let current = (today.year(), i32::try_from(today.month()).unwrap_or(12));
    (year, month) < current
}

/// The facts needed to pick a new default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCandidate {
    pub id: PaymentMethodId,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Pick the method to promote after the default has been removed.
///
/// Prefers the most recently added unexpired method and falls back to the
/// most recently added method of any kind.
#[must_use]
pub fn choose_replacement_default(
    candidates: &[DefaultCandidate],
    today: NaiveDate,
) -> Option<PaymentMethodId> {
    let newest = |usable: &dyn Fn(&DefaultCandidate) -> bool| {
        candidates
            .iter()
            .filter(|c| usable(c))
            .max_by_key(|c| c.created_at)
            .map(|c| c.id)
    };

    newest(&|c| !is_expired(c.exp_month, c.exp_year, today)).or_else(|| newest(&|_| true))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn test_card_valid_through_expiry_month() {
        assert!(!is_expired(Some(6), Some(2025), today()));
        assert!(is_expired(Some(5), Some(2025), today()));
        assert!(is_expired(Some(12), Some(2024), today()));
        assert!(!is_expired(Some(1), Some(2026), today()));
        assert!(!is_expired(None, None, today()));
    }

    #[test]
    fn test_replacement_prefers_newest_unexpired() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let old_valid = DefaultCandidate {
            id: PaymentMethodId::generate(),
            exp_month: Some(1),
            exp_year: Some(2030),
            created_at: base,
        };
        let new_expired = DefaultCandidate {
            id: PaymentMethodId::generate(),
            exp_month: Some(1),
            exp_year: Some(2024),
            created_at: base + Duration::days(10),
        };

        assert_eq!(
            choose_replacement_default(&[old_valid, new_expired], today()),
            Some(old_valid.id)
        );
    }

    #[test]
    fn test_replacement_falls_back_to_newest() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let a = DefaultCandidate {
            id: PaymentMethodId::generate(),
            exp_month: Some(1),
            exp_year: Some(2023),
            created_at: base,
        };
        let b = DefaultCandidate {
            created_at: base + Duration::days(1),
            id: PaymentMethodId::generate(),
            ..a
        };

        assert_eq!(choose_replacement_default(&[a, b], today()), Some(b.id));
        assert_eq!(choose_replacement_default(&[], today()), None);
    }
}
