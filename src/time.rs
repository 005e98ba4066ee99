//! Time algebra: instants, periods and their units.
//!
//! Every value in a simulation is attached to a [`Period`], a contiguous span
//! of days expressed as a unit (day, month, year or eternity), a start
//! [`Instant`] and a size. Periods are small `Copy` values; every offset or
//! subdivision builds a new one.

mod cache;
mod instant;
mod parse;
mod period;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::{PeriodCache, PeriodInput};
pub use instant::{Instant, Offset};
pub use period::Period;

/// Granularity of a period.
///
/// Units are ordered by weight: `Day < Month < Year < Eternity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    /// A civil day.
    Day,
    /// A calendar month.
    Month,
    /// A year, not necessarily starting in January.
    Year,
    /// Unbounded; eternal variables have a single value.
    Eternity,
}

impl DateUnit {
    /// Relative weight used to compare granularities.
    #[must_use]
    pub const fn weight(self) -> u16 {
        match self {
            Self::Day => 100,
            Self::Month => 200,
            Self::Year => 300,
            Self::Eternity => 400,
        }
    }

    /// Lowercase name, as used in period strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
            Self::Eternity => "eternity",
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateUnit {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "eternity" | "ETERNITY" => Ok(Self::Eternity),
            _ => Err(PeriodError::InvalidUnit {
                value: s.to_string(),
            }),
        }
    }
}

/// Errors raised by the time algebra.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error(
        "Expected a period (eg. '2017', '2017-01', '2017-01-01', 'month:2017-01:3', ...); got: '{value}'"
    )]
    InvalidPeriod { value: String },

    #[error("Expected a unit (day, month, year, eternity); got: '{value}'")]
    InvalidUnit { value: String },

    #[error("Invalid instant {year:04}-{month:02}-{day:02}")]
    InvalidInstant { year: i32, month: u32, day: u32 },

    #[error("Period size must be at least 1 (got {size})")]
    InvalidSize { size: u32 },

    #[error("Cannot subdivide {from} into {into}")]
    CannotSubdivide { from: DateUnit, into: DateUnit },

    #[error("Cannot compute the {what} of an eternity period")]
    Unbounded { what: &'static str },
}
