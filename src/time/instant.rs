//! Calendar days.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{DateUnit, Period, PeriodError};

/// Amount used to move an [`Instant`].
///
/// `FirstOf` and `LastOf` snap to the boundary of the enclosing month or
/// year; `By(n)` adds `n` units (negative values move backwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Offset {
    /// Snap to the first day of the enclosing unit.
    FirstOf,
    /// Snap to the last day of the enclosing unit.
    LastOf,
    /// Move by a number of units.
    By(i32),
}

impl From<i32> for Offset {
    fn from(amount: i32) -> Self {
        Self::By(amount)
    }
}

/// A calendar day `(year, month, day)`.
///
/// Instants are totally ordered (lexicographically) and always valid for the
/// proleptic Gregorian calendar, except for the [`Instant::MAX`] sentinel
/// which only takes part in comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instant {
    year: i32,
    month: u32,
    day: u32,
}

pub(crate) const fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub(crate) const fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

impl Instant {
    /// Start of eternity.
    pub const MIN: Self = Self {
        year: 1,
        month: 1,
        day: 1,
    };

    /// Stop of eternity. Only meaningful in comparisons.
    pub const MAX: Self = Self {
        year: i32::MAX,
        month: 12,
        day: 31,
    };

    /// Creates an instant, validating the day against the month length.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError::InvalidInstant` for an impossible date.
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return Err(PeriodError::InvalidInstant { year, month, day });
        }
        Ok(Self { year, month, day })
    }

    pub(crate) const fn from_parts(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Civil year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Month, 1 to 12.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// Day of month, 1 to 31.
    #[must_use]
    pub const fn day(&self) -> u32 {
        self.day
    }

    /// Converts to a chrono date. `None` outside chrono's supported range.
    #[must_use]
    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Builds a period of the given unit and size starting at this instant.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError::InvalidSize` when `size` is zero.
    pub fn period(self, unit: DateUnit, size: u32) -> Result<Period, PeriodError> {
        Period::new(unit, self, size)
    }

    /// Moves this instant.
    ///
    /// Month and year offsets keep the day number when it exists in the
    /// target month and clamp it to the last day otherwise. Day offsets roll
    /// over month and year boundaries. Offsetting by an eternity unit is the
    /// identity.
    #[must_use]
    pub fn offset(self, offset: impl Into<Offset>, unit: DateUnit) -> Self {
        match (offset.into(), unit) {
            (_, DateUnit::Eternity) | (Offset::FirstOf | Offset::LastOf, DateUnit::Day) => self,
            (Offset::FirstOf, DateUnit::Month) => Self::from_parts(self.year, self.month, 1),
            (Offset::FirstOf, DateUnit::Year) => Self::from_parts(self.year, 1, 1),
            (Offset::LastOf, DateUnit::Month) => {
                Self::from_parts(self.year, self.month, days_in_month(self.year, self.month))
            }
            (Offset::LastOf, DateUnit::Year) => Self::from_parts(self.year, 12, 31),
            (Offset::By(amount), DateUnit::Day) => self.add_days(i64::from(amount)),
            (Offset::By(amount), DateUnit::Month) => {
                let total = i64::from(self.year) * 12 + i64::from(self.month) - 1 + i64::from(amount);
                let year = saturate_year(total.div_euclid(12));
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let month = total.rem_euclid(12) as u32 + 1;
                Self::from_parts(year, month, self.day.min(days_in_month(year, month)))
            }
            (Offset::By(amount), DateUnit::Year) => {
                let year = saturate_year(i64::from(self.year) + i64::from(amount));
                Self::from_parts(year, self.month, self.day.min(days_in_month(year, self.month)))
            }
        }
    }

    /// Number of days from `self` to `other` (negative if `other` is earlier).
    #[must_use]
    pub fn days_until(&self, other: &Self) -> Option<i64> {
        Some((other.to_date()? - self.to_date()?).num_days())
    }

    fn add_days(self, days: i64) -> Self {
        let moved = self
            .to_date()
            .and_then(|date| date.checked_add_signed(Duration::days(days)));
        match moved {
            Some(date) => Self::from(date),
            None if days < 0 => Self::from(NaiveDate::MIN),
            None => Self::from(NaiveDate::MAX),
        }
    }
}

fn saturate_year(year: i64) -> i32 {
    i32::try_from(year).unwrap_or(if year < 0 { i32::MIN } else { i32::MAX })
}

impl From<NaiveDate> for Instant {
    fn from(date: NaiveDate) -> Self {
        Self::from_parts(date.year(), date.month(), date.day())
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}
