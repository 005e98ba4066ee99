//! Period grammar.
//!
//! Accepted forms: `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `ETERNITY` and
//! `unit:ISO[:size]` where `ISO` is one of the first three forms.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::{DateUnit, Instant, Period, PeriodError};

static SIMPLE_PERIOD: OnceLock<Regex> = OnceLock::new();

fn simple_period_regex() -> &'static Regex {
    SIMPLE_PERIOD.get_or_init(|| {
        Regex::new(r"^(\d{4})(?:-(\d{1,2}))?(?:-(\d{1,2}))?$").expect("valid period regex")
    })
}

/// Parses `YYYY`, `YYYY-MM` or `YYYY-MM-DD` into the period it names.
fn parse_simple(value: &str) -> Option<Period> {
    let captures = simple_period_regex().captures(value)?;
    let year: i32 = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2).map(|m| m.as_str().parse::<u32>());
    let day = captures.get(3).map(|d| d.as_str().parse::<u32>());
    match (month, day) {
        (None, None) => Some(Period::from_parts(
            DateUnit::Year,
            Instant::new(year, 1, 1).ok()?,
            1,
        )),
        (Some(month), None) => Some(Period::from_parts(
            DateUnit::Month,
            Instant::new(year, month.ok()?, 1).ok()?,
            1,
        )),
        (Some(month), Some(day)) => Some(Period::from_parts(
            DateUnit::Day,
            Instant::new(year, month.ok()?, day.ok()?).ok()?,
            1,
        )),
        (None, Some(_)) => None,
    }
}

impl Period {
    /// Parses a period from its string form.
    ///
    /// An explicit unit finer than what the ISO fragment pins down
    /// (`month:2014`, `day:2014-03`) is rejected as ambiguous.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError::InvalidPeriod` for anything outside the grammar.
    ///
    /// # Examples
    ///
    /// ```
    /// use microsim::time::{DateUnit, Period};
    ///
    /// let period = Period::parse("month:2022-03:3").unwrap();
    /// assert_eq!(period.unit(), DateUnit::Month);
    /// assert_eq!(period.size(), 3);
    /// assert!(Period::parse("month:2022").is_err());
    /// ```
    pub fn parse(value: &str) -> Result<Self, PeriodError> {
        let invalid = || PeriodError::InvalidPeriod {
            value: value.to_string(),
        };

        if value == "ETERNITY" || value == "eternity" {
            return Ok(Self::eternity());
        }
        if let Some(period) = parse_simple(value) {
            return Ok(period);
        }

        let components: Vec<&str> = value.split(':').collect();
        if components.len() < 2 || components.len() > 3 {
            return Err(invalid());
        }
        let unit = match components[0] {
            "day" => DateUnit::Day,
            "month" => DateUnit::Month,
            "year" => DateUnit::Year,
            _ => return Err(invalid()),
        };
        let base = parse_simple(components[1]).ok_or_else(invalid)?;
        let size = match components.get(2) {
            None => 1,
            Some(size) => size.parse::<u32>().map_err(|_| invalid())?,
        };
        if unit.weight() < base.unit().weight() {
            return Err(invalid());
        }
        Self::new(unit, base.start(), size).map_err(|_| invalid())
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
