//! Time amounts and relative time frames
//!
//! A [`TimeAmount`] is a signed quantity of a calendar unit (`"10second"`,
//! `"-2 months"`). A [`TimeFrame`] is a window of time resolved against a
//! reference instant, written as one of:
//!
//! - `last 7 day` / `next 2 week`
//! - `<instant> till <instant>` where an instant is `now`, `begin[<unit>]`
//!   or `end[<unit>]`, optionally followed by a `+N<unit>` / `-N<unit>` offset
//! - a bare offset such as `-7day`, meaning the window between now and
//!   now moved by the offset

use crate::calendar::{self, DateIntervalType};
use crate::error::{QueryError, Result};
use chrono::{Duration, NaiveDateTime, Weekday};
use std::fmt;
use std::str::FromStr;

/// Signed quantity of a date unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeAmount {
    pub quantity: i64,
    pub unit: DateIntervalType,
}

impl TimeAmount {
    pub fn new(quantity: i64, unit: DateIntervalType) -> Self {
        Self { quantity, unit }
    }

    /// Parse `"10second"`, `"5 minutes"`, `"+1day"`, `"-2 month"`
    pub fn parse(expr: &str) -> Result<Self> {
        let s = expr.trim();
        let split = s
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '+' || *c == '-'))))
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let quantity = match number {
            "" | "+" => 1,
            "-" => -1,
            n => n
                .parse::<i64>()
                .map_err(|_| QueryError::invalid_request(format!("Invalid time amount: '{}'", expr)))?,
        };
        let unit = unit
            .parse::<DateIntervalType>()
            .map_err(|e| QueryError::invalid_request(format!("Invalid time amount '{}': {}", expr, e)))?;
        if unit == DateIntervalType::DayOfWeek {
            return Err(QueryError::invalid_request(format!(
                "Invalid time amount '{}': DAY_OF_WEEK is not a duration",
                expr
            )));
        }
        Ok(Self { quantity, unit })
    }

    /// Apply to `dt`; `None` on calendar overflow
    pub fn add_to(&self, dt: NaiveDateTime) -> Option<NaiveDateTime> {
        calendar::add(dt, self.unit, self.quantity)
    }

    /// Wall-clock length, with months counted as 30 days. `None` if negative.
    pub fn to_std_duration(&self) -> Option<std::time::Duration> {
        let secs = self.quantity.checked_mul(self.unit.approx_seconds())?;
        u64::try_from(secs).ok().map(std::time::Duration::from_secs)
    }
}

impl FromStr for TimeAmount {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        TimeAmount::parse(s)
    }
}

impl fmt::Display for TimeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.quantity, self.unit.name().to_ascii_lowercase())
    }
}

/// A resolved, inclusive window of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFrame {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl TimeFrame {
    /// Parse `expr` and resolve it against `now`
    pub fn resolve(expr: &str, now: NaiveDateTime) -> Result<Self> {
        let invalid = || QueryError::invalid_request(format!("Invalid time frame: '{}'", expr));
        let s = expr.trim().to_ascii_lowercase();

        if let Some((a, b)) = s.split_once(" till ") {
            let from = resolve_instant(a, now).ok_or_else(invalid)?;
            let to = resolve_instant(b, now).ok_or_else(invalid)?;
            return Ok(Self::ordered(from, to));
        }

        let mut words = s.split_whitespace();
        match words.next() {
            Some(dir @ ("last" | "next")) => {
                let rest: String = words.collect::<Vec<_>>().join("");
                let amount = TimeAmount::parse(&rest).map_err(|_| invalid())?;
                let amount = if dir == "last" {
                    TimeAmount::new(-amount.quantity.abs(), amount.unit)
                } else {
                    TimeAmount::new(amount.quantity.abs(), amount.unit)
                };
                let other = amount.add_to(now).ok_or_else(invalid)?;
                Ok(Self::ordered(now, other))
            }
            Some(_) => {
                let amount = TimeAmount::parse(&s.replace(' ', "")).map_err(|_| invalid())?;
                let other = amount.add_to(now).ok_or_else(invalid)?;
                Ok(Self::ordered(now, other))
            }
            None => Err(invalid()),
        }
    }

    fn ordered(a: NaiveDateTime, b: NaiveDateTime) -> Self {
        if a <= b {
            Self { from: a, to: b }
        } else {
            Self { from: b, to: a }
        }
    }

    pub fn contains(&self, dt: NaiveDateTime) -> bool {
        self.from <= dt && dt <= self.to
    }
}

/// `now`, `begin[unit]` or `end[unit]`, with an optional trailing offset
fn resolve_instant(expr: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let s = expr.trim();
    let (base, rest) = if let Some(rest) = s.strip_prefix("now") {
        (now, rest)
    } else if let Some(rest) = s.strip_prefix("begin[") {
        let (unit, rest) = rest.split_once(']')?;
        let unit: DateIntervalType = unit.parse().ok()?;
        (calendar::truncate(now, unit, Weekday::Mon)?, rest)
    } else if let Some(rest) = s.strip_prefix("end[") {
        let (unit, rest) = rest.split_once(']')?;
        let unit: DateIntervalType = unit.parse().ok()?;
        let begin = calendar::truncate(now, unit, Weekday::Mon)?;
        let next = calendar::add(begin, unit, 1)?;
        (next - Duration::nanoseconds(1), rest)
    } else {
        (now, s)
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(base);
    }
    TimeAmount::parse(&rest.replace(' ', "")).ok()?.add_to(base)
}
