//! Subscription billing-interval arithmetic (§3, §4.8). Kept separate from
//! the scheduler crate so both the store (schema/validation) and the
//! scheduler (advancing `next_billing_date`) share one definition of what an
//! interval means.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BillingInterval {
    pub value: u32,
    pub unit: IntervalUnit,
}

impl BillingInterval {
    pub fn new(value: u32, unit: IntervalUnit) -> Self {
        Self { value, unit }
    }

    /// Advance `from` by this interval. Per §4.8 and the testable property in
    /// §8, this must always be computed from the *previous* anchor date, not
    /// from "now" — callers must not substitute `Utc::now()` here.
    pub fn advance(&self, from: NaiveDate) -> NaiveDate {
        match self.unit {
            IntervalUnit::Day => from + chrono::Duration::days(i64::from(self.value)),
            IntervalUnit::Week => from + chrono::Duration::weeks(i64::from(self.value)),
            IntervalUnit::Month => add_months(from, self.value),
            IntervalUnit::Year => add_months(from, self.value.saturating_mul(12)),
        }
    }
}

/// Add `months` calendar months to `date`, clamping the day-of-month into the
/// target month (e.g. Jan 31 + 1 month = Feb 28/29, never rolls into March).
fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    use chrono::Datelike;

    let total_months = date.month0() as i64 + i64::from(months);
    let year = date.year() + (total_months / 12) as i32;
    let month0 = (total_months % 12) as u32;

    let mut day = date.day();
    loop {
        if let Some(result) = NaiveDate::from_ymd_opt(year, month0 + 1, day) {
            return result;
        }
        // Month doesn't have this many days (e.g. Feb 30); clamp down.
        day -= 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn monthly_advance() {
        let interval = BillingInterval::new(1, IntervalUnit::Month);
        assert_eq!(interval.advance(d(2025, 2, 1)), d(2025, 3, 1));
    }

    #[test]
    fn monthly_advance_clamps_short_months() {
        let interval = BillingInterval::new(1, IntervalUnit::Month);
        // Jan 31 + 1 month -> Feb 28 (2025 is not a leap year).
        assert_eq!(interval.advance(d(2025, 1, 31)), d(2025, 2, 28));
    }

    #[test]
    fn yearly_advance_handles_leap_day() {
        let interval = BillingInterval::new(1, IntervalUnit::Year);
        assert_eq!(interval.advance(d(2024, 2, 29)), d(2025, 2, 28));
    }

    #[test]
    fn weekly_and_daily() {
        assert_eq!(
            BillingInterval::new(2, IntervalUnit::Week).advance(d(2025, 1, 1)),
            d(2025, 1, 15)
        );
        assert_eq!(
            BillingInterval::new(10, IntervalUnit::Day).advance(d(2025, 1, 1)),
            d(2025, 1, 11)
        );
    }
}
