//! Business-day arithmetic for the ACH pre-note cutoff (§4.6). "Business day"
//! here means Mon-Fri; we deliberately don't model bank holidays since the
//! source gateway doesn't surface a holiday calendar, and treating every
//! weekday as a business day is the conservative (slower-to-activate, never
//! faster) direction to be wrong in.

use chrono::{Datelike, NaiveDate, Weekday};

/// Add `n` business days to `start`, skipping Saturdays and Sundays.
pub fn add_business_days(start: NaiveDate, n: u32) -> NaiveDate {
    let mut date = start;
    let mut remaining = n;
    while remaining > 0 {
        date += chrono::Duration::days(1);
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining -= 1;
        }
    }
    date
}

/// Whether at least `n` business days have elapsed between `start` and `now`.
pub fn business_days_elapsed(start: NaiveDate, now: NaiveDate, n: u32) -> bool {
    now >= add_business_days(start, n)
}

#[cfg(test)]
mod test {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn skips_weekends() {
        // Friday + 1 business day = Monday.
        let friday = d(2025, 1, 3);
        assert_eq!(add_business_days(friday, 1), d(2025, 1, 6));
    }

    #[test]
    fn three_business_days_from_monday() {
        let monday = d(2025, 1, 6);
        // Tue, Wed, Thu.
        assert_eq!(add_business_days(monday, 3), d(2025, 1, 9));
    }

    #[test]
    fn elapsed_is_exclusive_before_cutoff() {
        let monday = d(2025, 1, 6);
        assert!(!business_days_elapsed(monday, d(2025, 1, 8), 3));
        assert!(business_days_elapsed(monday, d(2025, 1, 9), 3));
        assert!(business_days_elapsed(monday, d(2025, 1, 10), 3));
    }
}
