//! Future month grid.

use chrono::NaiveDate;

use crate::io::locale::{add_months, month_start, month_starts_between};

/// Month starts from the month after `last` through `end`, inclusive. Empty
/// when `end` is not after `last`'s month.
pub fn future_months(last: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    month_starts_between(add_months(month_start(last), 1), end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn starts_the_month_after_last_observation() {
        assert_eq!(
            future_months(d(2024, 10, 1), d(2025, 1, 1)),
            vec![d(2024, 11, 1), d(2024, 12, 1), d(2025, 1, 1)]
        );
        // Mid-month last date still moves to the next month.
        assert_eq!(future_months(d(2024, 10, 15), d(2024, 11, 30)), vec![d(2024, 11, 1)]);
    }

    #[test]
    fn end_before_next_month_is_empty() {
        assert!(future_months(d(2024, 10, 1), d(2024, 10, 31)).is_empty());
        assert!(future_months(d(2024, 10, 1), d(2020, 1, 1)).is_empty());
    }
}
