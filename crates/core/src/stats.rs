//! Dashboard statistics shapes and series helpers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// Revenue for one calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub sales: i64,
}

/// A best-selling product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub sales: i64,
    pub revenue: Decimal,
}

/// Everything the dashboard shows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Sum of completed and refunded sale totals.
    pub gross_revenue: Decimal,
    /// Sum of refunded sale totals.
    pub refunded: Decimal,
    /// `gross_revenue - refunded`.
    pub net_revenue: Decimal,
    /// Completed sales.
    pub sales_count: i64,
    pub customers: i64,
    pub active_subscriptions: i64,
    /// Monthly recurring revenue of live subscriptions.
    pub mrr: Decimal,
    pub open_disputes: i64,
    pub unread_notifications: i64,
    pub daily_revenue: Vec<DailyRevenue>,
    pub top_products: Vec<TopProduct>,
}

/// Expand sparse per-day points into one entry per day in `from..=to`.
///
/// Days without a point get zero revenue and zero sales. Points outside the
/// range are ignored; duplicate dates are summed.
#[must_use]
pub fn fill_daily_series(from: NaiveDate, to: NaiveDate, points: &[DailyRevenue]) -> Vec<DailyRevenue> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|date| {
            points
                .iter()
                .filter(|p| p.date == date)
                .fold(
                    DailyRevenue {
                        date,
                        revenue: Decimal::ZERO,
                        sales: 0,
                    },
                    |acc, p| DailyRevenue {
                        date,
                        revenue: acc.revenue + p.revenue,
                        sales: acc.sales + p.sales,
                    },
                )
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    #[test]
    fn test_fills_missing_days() {
        let points = [
            DailyRevenue {
                date: day(2),
                revenue: Decimal::new(1999, 2),
                sales: 1,
            },
            DailyRevenue {
                date: day(4),
                revenue: Decimal::new(500, 2),
                sales: 2,
            },
        ];
        let series = fill_daily_series(day(1), day(5), &points);

        assert_eq!(series.len(), 5);
        assert_eq!(series[0].revenue, Decimal::ZERO);
        assert_eq!(series[1].revenue, Decimal::new(1999, 2));
        assert_eq!(series[3].sales, 2);
        assert_eq!(series[4].date, day(5));
    }

    #[test]
    fn test_ignores_out_of_range_and_sums_duplicates() {
        let p = |d, cents| DailyRevenue {
            date: day(d),
            revenue: Decimal::new(cents, 2),
            sales: 1,
        };
        let series = fill_daily_series(day(10), day(11), &[p(9, 100), p(10, 100), p(10, 250)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].revenue, Decimal::new(350, 2));
        assert_eq!(series[0].sales, 2);
    }

    #[test]
    fn test_empty_when_range_inverted() {
        assert!(fill_daily_series(day(5), day(1), &[]).is_empty());
    }
}
