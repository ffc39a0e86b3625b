//! Construction-era buckets shared by the census and BER datasets.
//!
//! Both sides of the census merge must use the same bin edges; the merge
//! engine therefore routes every `year_of_construction` through
//! [`PeriodBuilt::from_year`] rather than trusting upstream labels.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Value;
use crate::frame::Frame;

pub const PERIOD_BUILT: &str = "period_built";
pub const YEAR_OF_CONSTRUCTION: &str = "year_of_construction";

/// Ordinal construction-era category. `NotStated` is the census sentinel and
/// never produced by year classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeriodBuilt {
    Pre1919,
    From1919To1945,
    From1946To1960,
    From1961To1970,
    From1971To1980,
    From1981To1990,
    From1991To2000,
    From2001To2010,
    From2011Onwards,
    NotStated,
}

pub const ALL_PERIODS: [PeriodBuilt; 9] = [
    PeriodBuilt::Pre1919,
    PeriodBuilt::From1919To1945,
    PeriodBuilt::From1946To1960,
    PeriodBuilt::From1961To1970,
    PeriodBuilt::From1971To1980,
    PeriodBuilt::From1981To1990,
    PeriodBuilt::From1991To2000,
    PeriodBuilt::From2001To2010,
    PeriodBuilt::From2011Onwards,
];

#[derive(Debug, Error)]
#[error("'{0}' is not a period-built label")]
pub struct ParsePeriodBuiltError(String);

impl PeriodBuilt {
    /// Buckets a construction year. Bins are left-open/right-closed on the
    /// edges {1919, 1945, 1960, 1970, 1980, 1990, 2000, 2011}; the first and
    /// last bins are unbounded, so the function is total over `i64`.
    pub fn from_year(year: i64) -> Self {
        match year {
            y if y <= 1919 => PeriodBuilt::Pre1919,
            y if y <= 1945 => PeriodBuilt::From1919To1945,
            y if y <= 1960 => PeriodBuilt::From1946To1960,
            y if y <= 1970 => PeriodBuilt::From1961To1970,
            y if y <= 1980 => PeriodBuilt::From1971To1980,
            y if y <= 1990 => PeriodBuilt::From1981To1990,
            y if y <= 2000 => PeriodBuilt::From1991To2000,
            y if y <= 2011 => PeriodBuilt::From2001To2010,
            _ => PeriodBuilt::From2011Onwards,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PeriodBuilt::Pre1919 => "PRE19",
            PeriodBuilt::From1919To1945 => "19_45",
            PeriodBuilt::From1946To1960 => "46_60",
            PeriodBuilt::From1961To1970 => "61_70",
            PeriodBuilt::From1971To1980 => "71_80",
            PeriodBuilt::From1981To1990 => "81_90",
            PeriodBuilt::From1991To2000 => "91_00",
            PeriodBuilt::From2001To2010 => "01_10",
            PeriodBuilt::From2011Onwards => "11L",
            PeriodBuilt::NotStated => "NS",
        }
    }

    pub fn is_not_stated(&self) -> bool {
        matches!(self, PeriodBuilt::NotStated)
    }
}

impl fmt::Display for PeriodBuilt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PeriodBuilt {
    type Err = ParsePeriodBuiltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ALL_PERIODS
            .iter()
            .chain(std::iter::once(&PeriodBuilt::NotStated))
            .find(|period| period.label() == trimmed)
            .copied()
            .ok_or_else(|| ParsePeriodBuiltError(s.to_string()))
    }
}

/// Writes (or overwrites) the `period_built` column from
/// `year_of_construction`. Rows with a null year get a null period.
pub fn classify_frame(frame: &mut Frame) -> Result<()> {
    let years = frame.require_column(YEAR_OF_CONSTRUCTION)?;
    let periods: Vec<Option<Value>> = years
        .values
        .iter()
        .map(|value| {
            value
                .as_ref()
                .and_then(|v| v.as_i64())
                .map(|year| Value::String(PeriodBuilt::from_year(year).label().to_string()))
        })
        .collect();
    frame.set_column(PERIOD_BUILT, periods)
}
