//! Weekday arithmetic

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Day of the week, numbered Monday=0 through Sunday=6
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Monday = 0,
    Tuesday = 1,
    Wednesday = 2,
    Thursday = 3,
    Friday = 4,
    Saturday = 5,
    Sunday = 6,
}

impl DayType {
    pub const ALL: [DayType; 7] = [
        DayType::Monday,
        DayType::Tuesday,
        DayType::Wednesday,
        DayType::Thursday,
        DayType::Friday,
        DayType::Saturday,
        DayType::Sunday,
    ];

    /// Days since Monday
    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }

    /// Two-letter iCalendar code (`MO`, `TU`, ...)
    pub fn ical_code(self) -> &'static str {
        match self {
            DayType::Monday => "MO",
            DayType::Tuesday => "TU",
            DayType::Wednesday => "WE",
            DayType::Thursday => "TH",
            DayType::Friday => "FR",
            DayType::Saturday => "SA",
            DayType::Sunday => "SU",
        }
    }
}

impl From<Weekday> for DayType {
    fn from(weekday: Weekday) -> Self {
        Self::ALL[weekday.num_days_from_monday() as usize]
    }
}

impl From<DayType> for Weekday {
    fn from(day: DayType) -> Self {
        match day {
            DayType::Monday => Weekday::Mon,
            DayType::Tuesday => Weekday::Tue,
            DayType::Wednesday => Weekday::Wed,
            DayType::Thursday => Weekday::Thu,
            DayType::Friday => Weekday::Fri,
            DayType::Saturday => Weekday::Sat,
            DayType::Sunday => Weekday::Sun,
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayType::Monday => "monday",
            DayType::Tuesday => "tuesday",
            DayType::Wednesday => "wednesday",
            DayType::Thursday => "thursday",
            DayType::Friday => "friday",
            DayType::Saturday => "saturday",
            DayType::Sunday => "sunday",
        };
        f.write_str(name)
    }
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// `day` within the week containing `date`
pub fn in_week_of(date: NaiveDate, day: DayType) -> NaiveDate {
    week_start(date) + Duration::days(day.number() as i64)
}

/// Number of `day`s in `[start, end]` inclusive
///
/// Both ends are moved to `day` within their own week, whole weeks are
/// counted between them, then the first week is dropped when `start` is
/// already past `day` and the last when `end` has not reached it. An
/// inverted range counts zero.
pub fn day_count(start: NaiveDate, end: NaiveDate, day: DayType) -> u32 {
    let target = day.number();

    let first = in_week_of(start, day);
    let last = in_week_of(end, day);

    let mut weeks = (last - first).num_days() / 7 + 1;

    if start.weekday().num_days_from_monday() > target {
        weeks -= 1;
    }
    if end.weekday().num_days_from_monday() < target {
        weeks -= 1;
    }

    weeks.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn brute_force(start: NaiveDate, end: NaiveDate, day: DayType) -> u32 {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| DayType::of(*d) == day)
            .count() as u32
    }

    #[test]
    fn test_day_numbers() {
        assert_eq!(DayType::Monday.number(), 0);
        assert_eq!(DayType::Sunday.number(), 6);
        assert_eq!(DayType::from(Weekday::Thu), DayType::Thursday);
        assert_eq!(Weekday::from(DayType::Saturday), Weekday::Sat);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_value(DayType::Tuesday).unwrap(), "tuesday");
        let day: DayType = serde_json::from_value(serde_json::json!("friday")).unwrap();
        assert_eq!(day, DayType::Friday);
    }

    #[test]
    fn test_wednesdays_in_october() {
        // 2024-10-04 is a Friday; the 2nd is outside the range
        assert_eq!(day_count(date(2024, 10, 4), date(2024, 10, 31), DayType::Wednesday), 4);
    }

    #[test]
    fn test_fall_semester_tuesdays_and_thursdays() {
        let (start, end) = (date(2024, 9, 1), date(2024, 12, 1));
        assert_eq!(day_count(start, end, DayType::Tuesday), 13);
        assert_eq!(day_count(start, end, DayType::Thursday), 13);
    }

    #[test]
    fn test_single_day_range() {
        let monday = date(2025, 7, 21);
        assert_eq!(day_count(monday, monday, DayType::Monday), 1);
        assert_eq!(day_count(monday, monday, DayType::Tuesday), 0);
    }

    #[test]
    fn test_inverted_range_is_zero() {
        assert_eq!(day_count(date(2024, 12, 1), date(2024, 9, 1), DayType::Monday), 0);
    }

    #[test]
    fn test_matches_brute_force() {
        let start = date(2024, 1, 3);
        for span in 0..40 {
            let end = start + Duration::days(span);
            for day in DayType::ALL {
                assert_eq!(day_count(start, end, day), brute_force(start, end, day), "{} +{}", day, span);
            }
        }
    }
}
