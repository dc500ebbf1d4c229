use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::OrderStatus;

// ============================================================================
// Order Statistics - read-only projections over orders
// ============================================================================

/// Cutoff instants for the day/week/month revenue windows.
///
/// Day starts at 00:00 UTC, weeks on Monday, months on the 1st.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatWindows {
    pub day_start: DateTime<Utc>,
    pub week_start: DateTime<Utc>,
    pub month_start: DateTime<Utc>,
}

impl StatWindows {
    pub fn at(now: DateTime<Utc>) -> Self {
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let week_start = day_start - Duration::days(i64::from(now.weekday().num_days_from_monday()));
        let month_start = day_start - Duration::days(i64::from(now.day0()));

        Self {
            day_start,
            week_start,
            month_start,
        }
    }
}

/// Order count and revenue for one status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBucket {
    pub status: OrderStatus,
    pub count: u64,
    pub revenue: Decimal,
}

/// The admin dashboard summary: counts and revenue by status, windowed
/// revenue, average order value and the pending/processing backlog.
///
/// Windowed revenue excludes cancelled and returned orders; the average is
/// taken over every order regardless of status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub total_orders: u64,
    pub by_status: Vec<StatusBucket>,
    pub revenue_today: Decimal,
    pub revenue_this_week: Decimal,
    pub revenue_this_month: Decimal,
    pub average_order_value: Decimal,
    /// Orders currently in `Pending` or `Processing`.
    pub needs_attention: u64,
}

impl OrderStatistics {
    /// Assembles the summary from per-backend aggregates so both store
    /// implementations derive the totals identically.
    pub fn from_parts(
        by_status: Vec<StatusBucket>,
        revenue_today: Decimal,
        revenue_this_week: Decimal,
        revenue_this_month: Decimal,
        average_order_value: Decimal,
    ) -> Self {
        let total_orders = by_status.iter().map(|b| b.count).sum();
        let needs_attention = by_status
            .iter()
            .filter(|b| matches!(b.status, OrderStatus::Pending | OrderStatus::Processing))
            .map(|b| b.count)
            .sum();

        Self {
            total_orders,
            by_status,
            revenue_today,
            revenue_this_week,
            revenue_this_month,
            average_order_value,
            needs_attention,
        }
    }

    pub fn count_for(&self, status: OrderStatus) -> u64 {
        self.by_status
            .iter()
            .find(|b| b.status == status)
            .map_or(0, |b| b.count)
    }

    pub fn revenue_for(&self, status: OrderStatus) -> Decimal {
        self.by_status
            .iter()
            .find(|b| b.status == status)
            .map_or(Decimal::ZERO, |b| b.revenue)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_windows_for_midweek_instant() {
        // Wednesday 2025-06-18 15:30 UTC.
        let now = Utc.with_ymd_and_hms(2025, 6, 18, 15, 30, 0).unwrap();
        let windows = StatWindows::at(now);

        assert_eq!(windows.day_start, Utc.with_ymd_and_hms(2025, 6, 18, 0, 0, 0).unwrap());
        assert_eq!(windows.week_start, Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap());
        assert_eq!(windows.month_start, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_windows_collapse_on_month_start_monday() {
        // 2025-09-01 is a Monday.
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();
        let windows = StatWindows::at(now);

        assert_eq!(windows.day_start, windows.week_start);
        assert_eq!(windows.day_start, windows.month_start);
    }

    #[test]
    fn test_from_parts_derives_totals() {
        let stats = OrderStatistics::from_parts(
            vec![
                StatusBucket {
                    status: OrderStatus::Pending,
                    count: 3,
                    revenue: Decimal::from(300),
                },
                StatusBucket {
                    status: OrderStatus::Processing,
                    count: 2,
                    revenue: Decimal::from(200),
                },
                StatusBucket {
                    status: OrderStatus::Delivered,
                    count: 5,
                    revenue: Decimal::from(500),
                },
            ],
            Decimal::from(100),
            Decimal::from(400),
            Decimal::from(1000),
            Decimal::from(100),
        );

        assert_eq!(stats.total_orders, 10);
        assert_eq!(stats.needs_attention, 5);
        assert_eq!(stats.count_for(OrderStatus::Delivered), 5);
        assert_eq!(stats.revenue_for(OrderStatus::Processing), Decimal::from(200));
        assert_eq!(stats.count_for(OrderStatus::Cancelled), 0);
    }
}
