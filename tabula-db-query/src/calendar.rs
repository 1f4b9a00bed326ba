//! Calendar arithmetic over `NaiveDateTime`
//!
//! Truncation to the start of an interval, stepping by whole intervals and
//! the labels used for date buckets.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date interval sizes, smallest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateIntervalType {
    Second,
    Minute,
    Hour,
    Day,
    /// Fixed grouping only: Monday..Sunday
    DayOfWeek,
    Week,
    Month,
    Quarter,
    Year,
    Decade,
    Century,
    #[serde(alias = "MILLENIUM")]
    Millennium,
}

impl DateIntervalType {
    /// Candidates for automatic dynamic sizing, smallest first
    pub const DYNAMIC_SIZES: [DateIntervalType; 11] = [
        DateIntervalType::Second,
        DateIntervalType::Minute,
        DateIntervalType::Hour,
        DateIntervalType::Day,
        DateIntervalType::Week,
        DateIntervalType::Month,
        DateIntervalType::Quarter,
        DateIntervalType::Year,
        DateIntervalType::Decade,
        DateIntervalType::Century,
        DateIntervalType::Millennium,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DateIntervalType::Second => "SECOND",
            DateIntervalType::Minute => "MINUTE",
            DateIntervalType::Hour => "HOUR",
            DateIntervalType::Day => "DAY",
            DateIntervalType::DayOfWeek => "DAY_OF_WEEK",
            DateIntervalType::Week => "WEEK",
            DateIntervalType::Month => "MONTH",
            DateIntervalType::Quarter => "QUARTER",
            DateIntervalType::Year => "YEAR",
            DateIntervalType::Decade => "DECADE",
            DateIntervalType::Century => "CENTURY",
            DateIntervalType::Millennium => "MILLENNIUM",
        }
    }

    /// Length in months for calendar-sized intervals
    fn months(&self) -> Option<u32> {
        match self {
            DateIntervalType::Month => Some(1),
            DateIntervalType::Quarter => Some(3),
            DateIntervalType::Year => Some(12),
            DateIntervalType::Decade => Some(120),
            DateIntervalType::Century => Some(1200),
            DateIntervalType::Millennium => Some(12000),
            _ => None,
        }
    }

    /// Fixed length for sub-month intervals
    fn duration(&self) -> Option<Duration> {
        match self {
            DateIntervalType::Second => Some(Duration::seconds(1)),
            DateIntervalType::Minute => Some(Duration::minutes(1)),
            DateIntervalType::Hour => Some(Duration::hours(1)),
            DateIntervalType::Day | DateIntervalType::DayOfWeek => Some(Duration::days(1)),
            DateIntervalType::Week => Some(Duration::weeks(1)),
            _ => None,
        }
    }

    /// Approximate length in seconds (months count as 30 days)
    pub fn approx_seconds(&self) -> i64 {
        match (self.duration(), self.months()) {
            (Some(d), _) => d.num_seconds(),
            (None, Some(m)) => i64::from(m) * 30 * 86_400,
            (None, None) => 0,
        }
    }
}

impl fmt::Display for DateIntervalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DateIntervalType {
    type Err = String;

    /// Accepts singular, plural and upper-case forms (`day`, `days`, `DAY`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let unit = match lower.as_str() {
            "second" | "seconds" | "sec" | "secs" | "s" => DateIntervalType::Second,
            "minute" | "minutes" | "min" | "mins" => DateIntervalType::Minute,
            "hour" | "hours" | "h" => DateIntervalType::Hour,
            "day" | "days" | "d" => DateIntervalType::Day,
            "day_of_week" => DateIntervalType::DayOfWeek,
            "week" | "weeks" | "w" => DateIntervalType::Week,
            "month" | "months" => DateIntervalType::Month,
            "quarter" | "quarters" => DateIntervalType::Quarter,
            "year" | "years" | "y" => DateIntervalType::Year,
            "decade" | "decades" => DateIntervalType::Decade,
            "century" | "centuries" => DateIntervalType::Century,
            "millennium" | "millennia" | "millenium" | "millenniums" => {
                DateIntervalType::Millennium
            }
            _ => return Err(format!("unknown date unit '{}'", s.trim())),
        };
        Ok(unit)
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn year_start(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).map(midnight)
}

/// Start of the interval of size `unit` containing `dt`.
///
/// Weeks start on `week_start`.
pub fn truncate(dt: NaiveDateTime, unit: DateIntervalType, week_start: Weekday) -> Option<NaiveDateTime> {
    let date = dt.date();
    match unit {
        DateIntervalType::Second => dt.with_nanosecond(0),
        DateIntervalType::Minute => dt.with_nanosecond(0)?.with_second(0),
        DateIntervalType::Hour => dt.with_nanosecond(0)?.with_second(0)?.with_minute(0),
        DateIntervalType::Day | DateIntervalType::DayOfWeek => Some(midnight(date)),
        DateIntervalType::Week => {
            let back = (date.weekday().num_days_from_monday() + 7
                - week_start.num_days_from_monday())
                % 7;
            Some(midnight(date - Duration::days(i64::from(back))))
        }
        DateIntervalType::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).map(midnight),
        DateIntervalType::Quarter => {
            let month = (date.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), month, 1).map(midnight)
        }
        DateIntervalType::Year => year_start(date.year()),
        DateIntervalType::Decade => year_start(date.year() - date.year().rem_euclid(10)),
        DateIntervalType::Century => year_start(date.year() - date.year().rem_euclid(100)),
        DateIntervalType::Millennium => year_start(date.year() - date.year().rem_euclid(1000)),
    }
}

/// `dt` moved by `n` intervals of size `unit` (negative moves back)
pub fn add(dt: NaiveDateTime, unit: DateIntervalType, n: i64) -> Option<NaiveDateTime> {
    if let Some(d) = unit.duration() {
        return dt.checked_add_signed(d.checked_mul(i32::try_from(n).ok()?)?);
    }
    let months = i64::from(unit.months()?).checked_mul(n)?;
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        dt.checked_add_months(magnitude)
    } else {
        dt.checked_sub_months(magnitude)
    }
}

/// Label of the dynamic bucket starting at `start`
pub fn dynamic_label(start: NaiveDateTime, unit: DateIntervalType) -> String {
    match unit {
        DateIntervalType::Second => start.format("%Y-%m-%d %H:%M:%S").to_string(),
        DateIntervalType::Minute => start.format("%Y-%m-%d %H:%M").to_string(),
        DateIntervalType::Hour => start.format("%Y-%m-%d %H").to_string(),
        DateIntervalType::Day | DateIntervalType::DayOfWeek | DateIntervalType::Week => {
            start.format("%Y-%m-%d").to_string()
        }
        DateIntervalType::Month => start.format("%Y-%m").to_string(),
        DateIntervalType::Quarter => format!("{}-Q{}", start.year(), start.month0() / 3 + 1),
        DateIntervalType::Year
        | DateIntervalType::Decade
        | DateIntervalType::Century
        | DateIntervalType::Millennium => start.year().to_string(),
    }
}

pub const MONTH_NAMES: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

pub const DAY_NAMES: [&str; 7] = [
    "MONDAY",
    "TUESDAY",
    "WEDNESDAY",
    "THURSDAY",
    "FRIDAY",
    "SATURDAY",
    "SUNDAY",
];

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_db_core::parse_date;

    fn dt(s: &str) -> NaiveDateTime {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_truncate() {
        let d = dt("2019-08-14 13:45:12");
        let mon = Weekday::Mon;
        assert_eq!(truncate(d, DateIntervalType::Minute, mon), Some(dt("2019-08-14 13:45:00")));
        assert_eq!(truncate(d, DateIntervalType::Day, mon), Some(dt("2019-08-14")));
        // 2019-08-14 is a Wednesday
        assert_eq!(truncate(d, DateIntervalType::Week, mon), Some(dt("2019-08-12")));
        assert_eq!(truncate(d, DateIntervalType::Week, Weekday::Sun), Some(dt("2019-08-11")));
        assert_eq!(truncate(d, DateIntervalType::Quarter, mon), Some(dt("2019-07-01")));
        assert_eq!(truncate(d, DateIntervalType::Decade, mon), Some(dt("2010-01-01")));
        assert_eq!(truncate(d, DateIntervalType::Millennium, mon), Some(dt("2000-01-01")));
    }

    #[test]
    fn test_add_months_and_durations() {
        let d = dt("2019-01-31");
        assert_eq!(add(d, DateIntervalType::Month, 1), Some(dt("2019-02-28")));
        assert_eq!(add(d, DateIntervalType::Quarter, -1), Some(dt("2018-10-31")));
        assert_eq!(add(d, DateIntervalType::Day, -31), Some(dt("2018-12-31")));
    }

    #[test]
    fn test_labels() {
        let d = dt("2019-03-07 13:05:09");
        assert_eq!(dynamic_label(d, DateIntervalType::Quarter), "2019-Q1");
        assert_eq!(dynamic_label(d, DateIntervalType::Hour), "2019-03-07 13");
        assert_eq!(dynamic_label(d, DateIntervalType::Month), "2019-03");
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!("days".parse::<DateIntervalType>(), Ok(DateIntervalType::Day));
        assert_eq!("MONTH".parse::<DateIntervalType>(), Ok(DateIntervalType::Month));
        assert!("fortnight".parse::<DateIntervalType>().is_err());
    }
}
