//! Year-month period identifier used as the curated partition key.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A six-digit `YYYYMM` period. Ordered by (year, month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("period '{0}' is not a six-digit YYYYMM value")]
    Malformed(String),

    #[error("period '{0}' has month outside 01..=12")]
    InvalidMonth(String),
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::InvalidMonth(format!("{year:04}{month:02}")));
        }
        if !(0..=9999).contains(&year) {
            return Err(PeriodError::Malformed(format!("{year}{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The period containing `date` shifted back by `months`.
    ///
    /// Source extracts are published with a lag, so the default build target is
    /// a few months behind the current date.
    pub fn months_before(date: NaiveDate, months: u32) -> Self {
        let shifted = date
            .with_day(1)
            .and_then(|d| d.checked_sub_months(Months::new(months)))
            .unwrap_or(date);
        Self {
            year: shifted.year(),
            month: shifted.month(),
        }
    }

    /// The following calendar month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every period from `start` to `end`, both inclusive. Empty if `start > end`.
    pub fn range_inclusive(start: Period, end: Period) -> Vec<Period> {
        let mut out = Vec::new();
        let mut current = start;
        while current <= end {
            out.push(current);
            current = current.next();
        }
        out
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PeriodError::Malformed(s.to_string()));
        }
        let year: i32 = s[..4]
            .parse()
            .map_err(|_| PeriodError::Malformed(s.to_string()))?;
        let month: u32 = s[4..]
            .parse()
            .map_err(|_| PeriodError::Malformed(s.to_string()))?;
        if !(1..=12).contains(&month) {
            return Err(PeriodError::InvalidMonth(s.to_string()));
        }
        Ok(Self { year, month })
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}
