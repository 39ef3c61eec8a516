//! Storage tiers and the canonical object layout.
//!
//! Layout (must stay path-exact for compatibility with existing data):
//! - raw: `{period}/{source}{period}`
//! - curated: `{table}/period={period}/data`
//! - aggregated: `{table}/data`

use crate::period::Period;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three named storage tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Raw,
    Curated,
    Aggregated,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Raw, Tier::Curated, Tier::Aggregated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Raw => "raw",
            Tier::Curated => "curated",
            Tier::Aggregated => "aggregated",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Tier::Raw),
            "curated" => Ok(Tier::Curated),
            "aggregated" => Ok(Tier::Aggregated),
            other => Err(format!(
                "unknown tier '{other}' (expected raw, curated or aggregated)"
            )),
        }
    }
}

/// File name of every curated and aggregated object.
pub const DATA_OBJECT: &str = "data";

/// Partition directory prefix for curated objects.
pub const PERIOD_KEY: &str = "period";

/// Prefix under which all raw objects of one period live: `{period}/`.
pub fn raw_prefix(period: Period) -> String {
    format!("{period}/")
}

/// Raw object for one source extract: `{period}/{source}{period}`.
pub fn raw_object(period: Period, source: &str) -> String {
    format!("{period}/{source}{period}")
}

/// Prefix under which all curated partitions of a table live: `{table}/`.
pub fn table_prefix(table: &str) -> String {
    format!("{table}/")
}

/// Curated object for one (table, period): `{table}/period={period}/data`.
pub fn curated_object(table: &str, period: Period) -> String {
    format!("{table}/{PERIOD_KEY}={period}/{DATA_OBJECT}")
}

/// Single aggregated object for a table: `{table}/data`.
pub fn aggregated_object(table: &str) -> String {
    format!("{table}/{DATA_OBJECT}")
}

/// Parse the period out of a curated object path belonging to `table`.
///
/// Returns `None` for anything that does not match `{table}/period={YYYYMM}/data`
/// exactly, including other tables sharing a name prefix.
pub fn parse_curated_object(table: &str, path: &str) -> Option<Period> {
    let rest = path.strip_prefix(table)?.strip_prefix('/')?;
    let rest = rest.strip_prefix(PERIOD_KEY)?.strip_prefix('=')?;
    let (period, tail) = rest.split_once('/')?;
    if tail != DATA_OBJECT {
        return None;
    }
    period.parse().ok()
}
