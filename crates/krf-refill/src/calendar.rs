use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use krf_schemas::DayClass;

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// Number of days in `month` (1..=12) of `year`; 0 for a month outside that range.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    if !(1..=12).contains(&month) {
        return 0;
    }
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(0)
}

/// Classify a civil date as a normal or end-of-month refill day.
pub fn classify(date: NaiveDate) -> DayClass {
    let today = date.day();
    let last_day_of_month = days_in_month(date.year(), date.month());
    DayClass {
        today,
        last_day_of_month,
        is_end_of_month: today == last_day_of_month,
    }
}

/// Classify the scheduler's reference timestamp as seen in `tz`.
pub fn classify_at(reference: DateTime<Utc>, tz: Tz) -> (NaiveDate, DayClass) {
    let local = reference.with_timezone(&tz).date_naive();
    (local, classify(local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_lengths_match_calendar() {
        let expected_2023 = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        for (i, want) in expected_2023.iter().enumerate() {
            assert_eq!(days_in_month(2023, i as u32 + 1), *want, "month {}", i + 1);
        }
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2023, 12), 31);
    }

    #[test]
    fn century_leap_rules() {
        assert!(is_leap_year(2000));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2100));
        assert!(!is_leap_year(2023));
    }

    #[test]
    fn out_of_range_month_has_no_days() {
        assert_eq!(days_in_month(2024, 0), 0);
        assert_eq!(days_in_month(2024, 13), 0);
    }

    #[test]
    fn month_length_agrees_with_next_month_minus_one_day() {
        let mut date = d(2020, 1, 1);
        while date < d(2030, 1, 1) {
            let next_first = if date.month() == 12 {
                d(date.year() + 1, 1, 1)
            } else {
                d(date.year(), date.month() + 1, 1)
            };
            let last = next_first - Duration::days(1);
            assert_eq!(days_in_month(date.year(), date.month()), last.day());
            date = next_first;
        }
    }

    #[test]
    fn leap_day_is_end_of_month() {
        let c = classify(d(2024, 2, 29));
        assert_eq!(c.today, 29);
        assert_eq!(c.last_day_of_month, 29);
        assert!(c.is_end_of_month);
    }

    #[test]
    fn feb_28_is_end_of_month_only_outside_leap_years() {
        assert!(classify(d(2023, 2, 28)).is_end_of_month);
        assert!(!classify(d(2024, 2, 28)).is_end_of_month);
    }

    #[test]
    fn mid_month_is_normal_day() {
        let c = classify(d(2024, 3, 15));
        assert_eq!(c.today, 15);
        assert_eq!(c.last_day_of_month, 31);
        assert!(!c.is_end_of_month);
    }

    #[test]
    fn classification_ignores_time_of_day() {
        let early = Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 59).unwrap();
        assert_eq!(classify_at(early, chrono_tz::UTC).1, classify_at(late, chrono_tz::UTC).1);
        assert!(classify_at(late, chrono_tz::UTC).1.is_end_of_month);
    }

    #[test]
    fn timezone_shifts_civil_date() {
        // 03:00 UTC on Mar 1 is still Feb 29 in New York.
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        let (date, c) = classify_at(ts, chrono_tz::America::New_York);
        assert_eq!(date, d(2024, 2, 29));
        assert!(c.is_end_of_month);

        let (date, c) = classify_at(ts, chrono_tz::UTC);
        assert_eq!(date, d(2024, 3, 1));
        assert!(!c.is_end_of_month);
    }
}
