//! Contiguous spans of time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::instant::days_in_month;
use super::{DateUnit, Instant, Offset, PeriodError};

/// A contiguous span `(unit, start, size)`.
///
/// For eternity the start is [`Instant::MIN`] and the size is unbounded
/// (stored as `u32::MAX`). Periods serialize to their canonical string.
///
/// # Examples
///
/// ```
/// use microsim::time::{DateUnit, Instant, Period};
///
/// let start = Instant::new(2022, 1, 1).unwrap();
/// let period = Period::new(DateUnit::Month, start, 12).unwrap();
/// assert_eq!(period.to_string(), "2022");
/// assert_eq!(period.size_in_months().unwrap(), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    unit: DateUnit,
    start: Instant,
    size: u32,
}

impl Period {
    /// Creates a period.
    ///
    /// Any eternity request yields the canonical eternity period.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError::InvalidSize` when `size` is zero.
    pub fn new(unit: DateUnit, start: Instant, size: u32) -> Result<Self, PeriodError> {
        if unit == DateUnit::Eternity {
            return Ok(Self::eternity());
        }
        if size == 0 {
            return Err(PeriodError::InvalidSize { size });
        }
        Ok(Self { unit, start, size })
    }

    /// The period covering all of time.
    #[must_use]
    pub const fn eternity() -> Self {
        Self {
            unit: DateUnit::Eternity,
            start: Instant::MIN,
            size: u32::MAX,
        }
    }

    /// Civil year `year`.
    ///
    /// # Errors
    ///
    /// Never fails for years representable by an [`Instant`]; kept fallible
    /// for symmetry with the other constructors.
    pub fn year(year: i32) -> Result<Self, PeriodError> {
        Self::new(DateUnit::Year, Instant::new(year, 1, 1)?, 1)
    }

    /// Calendar month `year-month`.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError::InvalidInstant` for a month outside `1..=12`.
    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        Self::new(DateUnit::Month, Instant::new(year, month, 1)?, 1)
    }

    pub(crate) const fn from_parts(unit: DateUnit, start: Instant, size: u32) -> Self {
        Self { unit, start, size }
    }

    /// Granularity.
    #[must_use]
    pub const fn unit(&self) -> DateUnit {
        self.unit
    }

    /// First day.
    #[must_use]
    pub const fn start(&self) -> Instant {
        self.start
    }

    /// Number of units covered.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// True for the unbounded period.
    #[must_use]
    pub fn is_eternity(&self) -> bool {
        self.unit == DateUnit::Eternity
    }

    /// Last day covered by the period (inclusive).
    #[must_use]
    pub fn stop(&self) -> Instant {
        let (year, month, day) = (self.start.year(), self.start.month(), self.start.day());
        match self.unit {
            DateUnit::Eternity => Instant::MAX,
            DateUnit::Day => self.start.offset(size_offset(self.size) - 1, DateUnit::Day),
            DateUnit::Month | DateUnit::Year => {
                let (mut year, mut month) = (i64::from(year), i64::from(month));
                if self.unit == DateUnit::Month {
                    month += i64::from(self.size);
                    year += (month - 1).div_euclid(12);
                    month = (month - 1).rem_euclid(12) + 1;
                } else {
                    year += i64::from(self.size);
                }
                let mut year = clamp_year(year);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let mut month = month as u32;
                let mut day = i64::from(day) - 1;
                if day < 1 {
                    month -= 1;
                    if month == 0 {
                        year -= 1;
                        month = 12;
                    }
                    day += i64::from(days_in_month(year, month));
                } else {
                    let last_day = i64::from(days_in_month(year, month));
                    if day > last_day {
                        month += 1;
                        if month == 13 {
                            year += 1;
                            month = 1;
                        }
                        day -= last_day;
                    }
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Instant::from_parts(year, month, day as u32)
            }
        }
    }

    /// True when `other` lies entirely within `self`.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && self.stop() >= other.stop()
    }

    /// Moves the period start by `amount` of its own unit.
    #[must_use]
    pub fn offset(&self, amount: impl Into<Offset>) -> Self {
        self.offset_by(amount, self.unit)
    }

    /// Moves the period start by `amount` of `unit`, keeping unit and size.
    #[must_use]
    pub fn offset_by(&self, amount: impl Into<Offset>, unit: DateUnit) -> Self {
        if self.is_eternity() {
            return *self;
        }
        Self::from_parts(self.unit, self.start.offset(amount, unit), self.size)
    }

    /// Number of months covered.
    ///
    /// # Errors
    ///
    /// Fails for day and eternity periods.
    pub fn size_in_months(&self) -> Result<u32, PeriodError> {
        match self.unit {
            DateUnit::Month => Ok(self.size),
            DateUnit::Year => Ok(self.size.saturating_mul(12)),
            DateUnit::Day => Err(PeriodError::CannotSubdivide {
                from: DateUnit::Day,
                into: DateUnit::Month,
            }),
            DateUnit::Eternity => Err(PeriodError::Unbounded { what: "size in months" }),
        }
    }

    /// Number of days covered.
    ///
    /// # Errors
    ///
    /// Fails for eternity.
    pub fn size_in_days(&self) -> Result<u32, PeriodError> {
        match self.unit {
            DateUnit::Day => Ok(self.size),
            DateUnit::Eternity => Err(PeriodError::Unbounded { what: "size in days" }),
            DateUnit::Month | DateUnit::Year => {
                let days = self
                    .start
                    .days_until(&self.stop())
                    .ok_or(PeriodError::Unbounded { what: "size in days" })?;
                u32::try_from(days + 1).map_err(|_| PeriodError::Unbounded { what: "size in days" })
            }
        }
    }

    /// Alias of [`Period::size_in_days`].
    ///
    /// # Errors
    ///
    /// Fails for eternity.
    pub fn days(&self) -> Result<u32, PeriodError> {
        self.size_in_days()
    }

    /// Number of `unit`-long subperiods covering this period.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Period::subperiods`].
    pub fn count(&self, unit: DateUnit) -> Result<u32, PeriodError> {
        self.check_subdivision(unit)?;
        match unit {
            DateUnit::Year => Ok(self.size),
            DateUnit::Month => self.size_in_months(),
            DateUnit::Day => self.size_in_days(),
            DateUnit::Eternity => Ok(1),
        }
    }

    /// Decomposes the period into unit-long periods, in chronological order.
    ///
    /// Year subperiods start from the first of January of the start year.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError::CannotSubdivide` when `unit` is coarser than the
    /// period's own unit, and `PeriodError::Unbounded` for eternity.
    pub fn subperiods(&self, unit: DateUnit) -> Result<Vec<Self>, PeriodError> {
        self.check_subdivision(unit)?;
        let (first, count) = match unit {
            DateUnit::Eternity => return Ok(vec![*self]),
            DateUnit::Year => (self.this_year(), self.size),
            DateUnit::Month => (self.first_month(), self.size_in_months()?),
            DateUnit::Day => (self.first_day(), self.size_in_days()?),
        };
        Ok((0..count)
            .map(|i| first.offset(size_offset(i)))
            .collect())
    }

    fn check_subdivision(&self, unit: DateUnit) -> Result<(), PeriodError> {
        if self.unit.weight() < unit.weight() {
            return Err(PeriodError::CannotSubdivide {
                from: self.unit,
                into: unit,
            });
        }
        if self.is_eternity() && unit != DateUnit::Eternity {
            return Err(PeriodError::Unbounded { what: "subperiods" });
        }
        Ok(())
    }

    /// Day-long period starting at the period start.
    #[must_use]
    pub fn first_day(&self) -> Self {
        Self::from_parts(DateUnit::Day, self.start, 1)
    }

    /// Day-long period on the period's last day.
    #[must_use]
    pub fn last_day(&self) -> Self {
        Self::from_parts(DateUnit::Day, self.stop(), 1)
    }

    /// Month containing the period start.
    #[must_use]
    pub fn first_month(&self) -> Self {
        Self::from_parts(
            DateUnit::Month,
            self.start.offset(Offset::FirstOf, DateUnit::Month),
            1,
        )
    }

    /// Civil year containing the period start.
    #[must_use]
    pub fn this_year(&self) -> Self {
        Self::from_parts(
            DateUnit::Year,
            self.start.offset(Offset::FirstOf, DateUnit::Year),
            1,
        )
    }

    /// Month preceding the first month.
    #[must_use]
    pub fn last_month(&self) -> Self {
        self.first_month().offset(-1)
    }

    /// The three months preceding the first month.
    #[must_use]
    pub fn last_3_months(&self) -> Self {
        let start = self.first_month().start.offset(-3, DateUnit::Month);
        Self::from_parts(DateUnit::Month, start, 3)
    }

    /// Civil year preceding this one.
    #[must_use]
    pub fn last_year(&self) -> Self {
        self.this_year().offset(-1)
    }

    /// Civil year two years before this one.
    #[must_use]
    pub fn n_2(&self) -> Self {
        self.this_year().offset(-2)
    }

    /// Intersection with `[start, stop]`.
    ///
    /// The result is expressed in years, months or days depending on which
    /// boundaries line up. `None` bounds are taken from `self`.
    #[must_use]
    pub fn intersection(&self, start: Option<Instant>, stop: Option<Instant>) -> Option<Self> {
        if start.is_none() && stop.is_none() {
            return Some(*self);
        }
        let period_start = self.start;
        let period_stop = self.stop();
        let start = start.unwrap_or(period_start);
        let stop = stop.unwrap_or(period_stop);
        if stop < period_start || period_stop < start {
            return None;
        }
        let inter_start = period_start.max(start);
        let inter_stop = period_stop.min(stop);
        if inter_start == period_start && inter_stop == period_stop {
            return Some(*self);
        }
        if inter_start.day() == 1
            && inter_start.month() == 1
            && inter_stop.day() == 31
            && inter_stop.month() == 12
        {
            let years = inter_stop.year() - inter_start.year() + 1;
            return Some(Self::from_parts(DateUnit::Year, inter_start, u32::try_from(years).ok()?));
        }
        if inter_start.day() == 1
            && inter_stop.day() == days_in_month(inter_stop.year(), inter_stop.month())
        {
            let months = i64::from(inter_stop.year() - inter_start.year()) * 12
                + i64::from(inter_stop.month())
                - i64::from(inter_start.month())
                + 1;
            return Some(Self::from_parts(DateUnit::Month, inter_start, u32::try_from(months).ok()?));
        }
        let days = inter_start.days_until(&inter_stop)? + 1;
        Some(Self::from_parts(DateUnit::Day, inter_start, u32::try_from(days).ok()?))
    }
}

fn size_offset(size: u32) -> i32 {
    i32::try_from(size).unwrap_or(i32::MAX)
}

fn clamp_year(year: i64) -> i32 {
    i32::try_from(year).unwrap_or(if year < 0 { i32::MIN } else { i32::MAX })
}

/// Chronological: by start, then unit, then size.
impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, self.unit, self.size).cmp(&(other.start, other.unit, other.size))
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (year, month, day) = (self.start.year(), self.start.month(), self.start.day());
        match (self.unit, self.size) {
            (DateUnit::Eternity, _) => f.write_str("ETERNITY"),
            (DateUnit::Month, 12) | (DateUnit::Year, 1) => {
                if month == 1 {
                    write!(f, "{year}")
                } else {
                    write!(f, "year:{year}-{month:02}")
                }
            }
            (DateUnit::Month, 1) => write!(f, "{year}-{month:02}"),
            (DateUnit::Year, size) if month == 1 => write!(f, "year:{year}:{size}"),
            (DateUnit::Day, 1) => write!(f, "{year}-{month:02}-{day:02}"),
            (DateUnit::Day, size) => write!(f, "day:{year}-{month:02}-{day:02}:{size}"),
            (unit, size) => write!(f, "{unit}:{year}-{month:02}:{size}"),
        }
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
