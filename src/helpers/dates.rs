//! Expansion of a start/end date pair into the individual days an entry
//! batch should cover.

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::info;

/// Ordered, inclusive sequence of calendar dates from `start` to `end`.
///
/// With `include_weekends` false, Saturdays and Sundays are dropped while the
/// relative order of the remaining days is preserved. The walk is day by day
/// over the real calendar, so leap years come out right. An inverted range
/// yields an empty sequence.
pub fn expand(start: NaiveDate, end: NaiveDate, include_weekends: bool) -> Vec<NaiveDate> {
    let days: Vec<NaiveDate> = start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| include_weekends || !is_weekend(*day))
        .collect();

    info!(
        "Expanded range {} to {} into {} day(s) (weekends {})",
        start,
        end,
        days.len(),
        if include_weekends { "included" } else { "excluded" }
    );
    days
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn inclusive_day_count() {
        let days = expand(date(2024, 1, 1), date(2024, 1, 7), true);
        assert_eq!(days.len(), 7);
        assert_eq!(days.first(), Some(&date(2024, 1, 1)));
        assert_eq!(days.last(), Some(&date(2024, 1, 7)));
    }

    #[test]
    fn excludes_weekends_preserving_order() {
        let days = expand(date(2024, 1, 1), date(2024, 1, 7), false);
        let expected: Vec<NaiveDate> = (1..=5).map(|d| date(2024, 1, d)).collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn weekday_output_is_subsequence_of_full_output() {
        let all = expand(date(2024, 2, 1), date(2024, 3, 15), true);
        let weekdays = expand(date(2024, 2, 1), date(2024, 3, 15), false);
        let mut iter = all.iter();
        assert!(weekdays.iter().all(|d| iter.any(|a| a == d)));
    }

    #[test]
    fn counts_leap_day() {
        let days = expand(date(2024, 2, 28), date(2024, 3, 1), true);
        assert_eq!(days.len(), 3);
        assert_eq!(days[1], date(2024, 2, 29));
    }

    #[test]
    fn spans_multiple_years_exactly() {
        // 2024 is a leap year: 366 + 365 days.
        let days = expand(date(2024, 1, 1), date(2025, 12, 31), true);
        assert_eq!(days.len(), 731);
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(expand(date(2024, 1, 7), date(2024, 1, 1), true).is_empty());
    }
}
