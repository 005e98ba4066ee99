//! Normalization of loosely-typed period arguments.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::{DateUnit, Instant, Period, PeriodError};

/// Anything a caller may pass where a period is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodInput {
    /// An already built period.
    Period(Period),
    /// A period string such as `2024-03` or `month:2024-01:3`.
    Text(String),
    /// A civil year.
    Year(i32),
    /// A single day.
    Instant(Instant),
}

impl From<Period> for PeriodInput {
    fn from(period: Period) -> Self {
        Self::Period(period)
    }
}

impl From<&Period> for PeriodInput {
    fn from(period: &Period) -> Self {
        Self::Period(*period)
    }
}

impl From<&str> for PeriodInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PeriodInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for PeriodInput {
    fn from(year: i32) -> Self {
        Self::Year(year)
    }
}

impl From<Instant> for PeriodInput {
    fn from(instant: Instant) -> Self {
        Self::Instant(instant)
    }
}

impl From<NaiveDate> for PeriodInput {
    fn from(date: NaiveDate) -> Self {
        Self::Instant(Instant::from(date))
    }
}

impl PeriodInput {
    /// Converts without memoization.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError` when the input does not name a period.
    pub fn into_period(self) -> Result<Period, PeriodError> {
        match self {
            Self::Period(period) => Ok(period),
            Self::Text(text) => Period::parse(&text),
            Self::Year(year) => Period::year(year),
            Self::Instant(instant) => Period::new(DateUnit::Day, instant, 1),
        }
    }
}

/// Memo of parsed period strings.
///
/// Owned by a simulation so its lifetime is the simulation's; nothing is
/// shared between runs.
#[derive(Debug, Default)]
pub struct PeriodCache {
    parsed: HashMap<String, Period>,
}

impl PeriodCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `input` into a period, reusing earlier string parses.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError` when the input does not name a period.
    pub fn resolve(&mut self, input: impl Into<PeriodInput>) -> Result<Period, PeriodError> {
        match input.into() {
            PeriodInput::Text(text) => {
                if let Some(period) = self.parsed.get(&text) {
                    return Ok(*period);
                }
                let period = Period::parse(&text)?;
                self.parsed.insert(text, period);
                Ok(period)
            }
            other => other.into_period(),
        }
    }

    /// Number of memoized strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parsed.len()
    }

    /// True when nothing was memoized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parsed.is_empty()
    }

    /// Forgets every memoized parse.
    pub fn clear(&mut self) {
        self.parsed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_normalize() {
        let mut cache = PeriodCache::new();
        assert_eq!(cache.resolve(2022).unwrap(), Period::year(2022).unwrap());
        assert_eq!(cache.resolve("2022-03").unwrap(), Period::month(2022, 3).unwrap());
        let date = NaiveDate::from_ymd_opt(2022, 3, 5).unwrap();
        let day = cache.resolve(date).unwrap();
        assert_eq!(day.unit(), DateUnit::Day);
        assert_eq!(day.to_string(), "2022-03-05");
        let period = Period::month(2022, 1).unwrap();
        assert_eq!(cache.resolve(&period).unwrap(), period);
    }

    #[test]
    fn test_strings_are_memoized() {
        let mut cache = PeriodCache::new();
        assert!(cache.is_empty());
        cache.resolve("2022-03").unwrap();
        cache.resolve("2022-03").unwrap();
        cache.resolve(String::from("2022")).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.resolve("not-a-period").is_err());
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
