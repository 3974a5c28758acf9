//! Subscription schedules and billing-date math.
//!
//! Month-based cycles keep an *anchor day*: the day of month the subscription
//! first billed on. Short months clamp to their last day, and the next period
//! returns to the anchor, so a subscription started on Jan 31 bills
//! Feb 29 (leap year), then Mar 31, then Apr 30.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::money::round_cents;
use crate::types::{BillingCycle, SubscriptionStatus};

/// Days a past-due subscription keeps trying to renew before it expires.
pub const PAST_DUE_GRACE_DAYS: i64 = 7;

impl BillingCycle {
    /// Calendar months per period, or `None` for week-based cycles.
    #[must_use]
    pub const fn months(&self) -> Option<u32> {
        match self {
            Self::Weekly => None,
            Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::Yearly => Some(12),
        }
    }
}

/// Number of days in the given month.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

/// The billing instant one cycle after `from`.
///
/// Weekly cycles add seven days. Month-based cycles add calendar months,
/// keep the time of day, and land on `anchor_day` clamped to the target
/// month's length.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn advance(from: DateTime<Utc>, cycle: BillingCycle, anchor_day: u32) -> DateTime<Utc> {
    let Some(months) = cycle.months() else {
        return from + Duration::days(7);
    };

    let month_index = from.year() * 12 + from.month0() as i32 + months as i32;
    let year = month_index.div_euclid(12);
    let month = month_index.rem_euclid(12) as u32 + 1;
    let day = anchor_day.clamp(1, 31).min(days_in_month(year, month));

    // The clamp above keeps the date valid; the fallback only guards chrono's range.
    NaiveDate::from_ymd_opt(year, month, day).map_or(from, |date| {
        date.and_time(from.time()).and_utc()
    })
}

/// The billing state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Billing cadence.
    pub cycle: BillingCycle,
    /// Trialing while inside the trial, otherwise Active.
    pub status: SubscriptionStatus,
    /// End of the free trial, if there was one.
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Start of the current paid (or trial) period.
    pub current_period_start: DateTime<Utc>,
    /// End of the current period; the next billing instant.
    pub current_period_end: DateTime<Utc>,
    /// Day of month month-based cycles return to.
    pub anchor_day: u32,
}

impl Schedule {
    /// Schedule for a subscription starting at `start`.
    ///
    /// With a trial the first period is the trial itself and billing anchors
    /// on the day the trial ends.
    #[must_use]
    pub fn begin(start: DateTime<Utc>, cycle: BillingCycle, trial_days: u32) -> Self {
        if trial_days > 0 {
            let trial_end = start + Duration::days(i64::from(trial_days));
            return Self {
                cycle,
                status: SubscriptionStatus::Trialing,
                trial_ends_at: Some(trial_end),
                current_period_start: start,
                current_period_end: trial_end,
                anchor_day: trial_end.day(),
            };
        }

        let anchor_day = start.day();
        Self {
            cycle,
            status: SubscriptionStatus::Active,
            trial_ends_at: None,
            current_period_start: start,
            current_period_end: advance(start, cycle, anchor_day),
            anchor_day,
        }
    }

    /// The schedule after one successful renewal.
    #[must_use]
    pub fn renew(&self) -> Self {
        Self {
            status: SubscriptionStatus::Active,
            current_period_start: self.current_period_end,
            current_period_end: advance(self.current_period_end, self.cycle, self.anchor_day),
            ..*self
        }
    }

    /// Whole days until the current period ends (zero once it has ended).
    #[must_use]
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.current_period_end - now).num_days().max(0)
    }
}

/// Monthly-equivalent price used for MRR.
#[must_use]
pub fn monthly_equivalent(price: Decimal, cycle: BillingCycle) -> Decimal {
    let monthly = match cycle {
        BillingCycle::Weekly => price * Decimal::from(52) / Decimal::from(12),
        BillingCycle::Monthly => price,
        BillingCycle::Quarterly => price / Decimal::from(3),
        BillingCycle::Yearly => price / Decimal::from(12),
    };
    round_cents(monthly)
}

/// Facts the renewal sweep needs about one subscription.
#[derive(Debug, Clone, Copy)]
pub struct RenewalInput {
    /// Current status.
    pub status: SubscriptionStatus,
    /// End of the current period.
    pub current_period_end: DateTime<Utc>,
    /// Whether the customer asked to stop at the end of the period.
    pub cancel_at_period_end: bool,
    /// Whether the customer has a default payment method to charge.
    pub has_payment_method: bool,
}

/// What the renewal sweep should do with a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// Nothing is due yet (or the subscription is already final).
    NotDue,
    /// Charge the default payment method and start the next period.
    Renew,
    /// Due, but there is nothing to charge.
    MarkPastDue,
    /// Stop the subscription.
    Expire,
}

/// Decide the renewal outcome at `now`.
#[must_use]
pub fn renewal_outcome(input: &RenewalInput, now: DateTime<Utc>) -> RenewalOutcome {
    match input.status {
        SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => RenewalOutcome::NotDue,
        SubscriptionStatus::PastDue => {
            if input.cancel_at_period_end
                || now >= input.current_period_end + Duration::days(PAST_DUE_GRACE_DAYS)
            {
                RenewalOutcome::Expire
            } else if input.has_payment_method {
                RenewalOutcome::Renew
            } else {
                RenewalOutcome::NotDue
            }
        }
        SubscriptionStatus::Trialing | SubscriptionStatus::Active => {
            if now < input.current_period_end {
                RenewalOutcome::NotDue
            } else if input.cancel_at_period_end {
                RenewalOutcome::Expire
            } else if input.has_payment_method {
                RenewalOutcome::Renew
            } else {
                RenewalOutcome::MarkPastDue
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(days_in_month(2025, 4), 30);
    }

    #[test]
    fn test_monthly_clamps_then_returns_to_anchor() {
        let jan = at(2024, 1, 31);
        let feb = advance(jan, BillingCycle::Monthly, 31);
        assert_eq!(feb, at(2024, 2, 29));
        let mar = advance(feb, BillingCycle::Monthly, 31);
        assert_eq!(mar, at(2024, 3, 31));
        let apr = advance(mar, BillingCycle::Monthly, 31);
        assert_eq!(apr, at(2024, 4, 30));
    }

    #[test]
    fn test_quarterly_and_yearly_cross_year_boundaries() {
        let nov = at(2024, 11, 30);
        assert_eq!(advance(nov, BillingCycle::Quarterly, 30), at(2025, 2, 28));

        let leap = at(2024, 2, 29);
        let next = advance(leap, BillingCycle::Yearly, 29);
        assert_eq!(next, at(2025, 2, 28));
        assert_eq!(advance(next, BillingCycle::Yearly, 29), at(2026, 2, 28));
    }

    #[test]
    fn test_weekly_adds_seven_days() {
        assert_eq!(
            advance(at(2024, 12, 29), BillingCycle::Weekly, 29),
            at(2025, 1, 5)
        );
    }

    #[test]
    fn test_begin_without_trial() {
        let schedule = Schedule::begin(at(2025, 1, 31), BillingCycle::Monthly, 0);
        assert_eq!(schedule.status, SubscriptionStatus::Active);
        assert_eq!(schedule.trial_ends_at, None);
        assert_eq!(schedule.anchor_day, 31);
        assert_eq!(schedule.current_period_end, at(2025, 2, 28));

        let renewed = schedule.renew();
        assert_eq!(renewed.current_period_start, at(2025, 2, 28));
        assert_eq!(renewed.current_period_end, at(2025, 3, 31));
    }

    #[test]
    fn test_begin_with_trial_anchors_on_trial_end() {
        let schedule = Schedule::begin(at(2025, 3, 20), BillingCycle::Monthly, 14);
        assert_eq!(schedule.status, SubscriptionStatus::Trialing);
        assert_eq!(schedule.trial_ends_at, Some(at(2025, 4, 3)));
        assert_eq!(schedule.current_period_end, at(2025, 4, 3));
        assert_eq!(schedule.anchor_day, 3);

        let renewed = schedule.renew();
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.current_period_end, at(2025, 5, 3));
        assert_eq!(renewed.trial_ends_at, Some(at(2025, 4, 3)));
    }

    #[test]
    fn test_days_remaining_never_negative() {
        let schedule = Schedule::begin(at(2025, 1, 1), BillingCycle::Weekly, 0);
        assert_eq!(schedule.days_remaining(at(2025, 1, 3)), 5);
        assert_eq!(schedule.days_remaining(at(2025, 2, 1)), 0);
    }

    #[test]
    fn test_monthly_equivalent() {
        let price = Decimal::new(1200, 2);
        assert_eq!(monthly_equivalent(price, BillingCycle::Monthly), price);
        assert_eq!(
            monthly_equivalent(price, BillingCycle::Yearly),
            Decimal::new(100, 2)
        );
        assert_eq!(
            monthly_equivalent(price, BillingCycle::Quarterly),
            Decimal::new(400, 2)
        );
        assert_eq!(
            monthly_equivalent(Decimal::new(300, 2), BillingCycle::Weekly),
            Decimal::new(1300, 2)
        );
    }

    fn input(status: SubscriptionStatus, cancel: bool, has_pm: bool) -> RenewalInput {
        RenewalInput {
            status,
            current_period_end: at(2025, 6, 1),
            cancel_at_period_end: cancel,
            has_payment_method: has_pm,
        }
    }

    #[test]
    fn test_renewal_not_due_before_period_end() {
        let outcome = renewal_outcome(
            &input(SubscriptionStatus::Active, false, true),
            at(2025, 5, 31),
        );
        assert_eq!(outcome, RenewalOutcome::NotDue);
    }

    #[test]
    fn test_renewal_due_paths() {
        let due = at(2025, 6, 1);
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::Active, false, true), due),
            RenewalOutcome::Renew
        );
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::Trialing, false, false), due),
            RenewalOutcome::MarkPastDue
        );
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::Active, true, true), due),
            RenewalOutcome::Expire
        );
    }

    #[test]
    fn test_past_due_retries_then_expires_after_grace() {
        let inside_grace = at(2025, 6, 5);
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::PastDue, false, true), inside_grace),
            RenewalOutcome::Renew
        );
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::PastDue, false, false), inside_grace),
            RenewalOutcome::NotDue
        );
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::PastDue, false, false), at(2025, 6, 8)),
            RenewalOutcome::Expire
        );
        // Cancelled at period end: never charged again, even with a new card
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::PastDue, true, true), at(2025, 6, 3)),
            RenewalOutcome::Expire
        );
    }

    #[test]
    fn test_final_states_are_left_alone() {
        let later = at(2030, 1, 1);
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::Cancelled, false, true), later),
            RenewalOutcome::NotDue
        );
        assert_eq!(
            renewal_outcome(&input(SubscriptionStatus::Expired, false, true), later),
            RenewalOutcome::NotDue
        );
    }
}
