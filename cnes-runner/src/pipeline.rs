//! Entry points used by the CLI.
//!
//! - `build_period()`: load the raw extracts one period needs, then run the
//!   incremental runner
//! - `build_period_range()`: `build_period()` for every period of a range, in order
//! - `build_aggregated()`: rebuild aggregated tables from all curated periods
//! - `check_sources()`: which raw extracts a period has and which are still missing

use cnes_core::{BuildError, Period, StorageError, StorageTier, TableRegistry};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::full_load::{FullLoadBuildRunner, FullLoadOptions};
use crate::incremental::{IncrementalBuildRunner, IncrementalOptions};
use crate::raw_loader::{LoadError, RawLoader};
use crate::report::{FullLoadReport, IncrementalReport};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("empty period range: {from} is after {to}")]
    EmptyRange { from: Period, to: Period },
}

/// Build the curated tables of one period.
///
/// The run is planned before any raw object is read, so registry problems
/// surface without I/O. Only the extracts the planned tables use are loaded.
pub fn build_period(
    registry: &TableRegistry,
    storage: &dyn StorageTier,
    period: Period,
    options: IncrementalOptions,
) -> Result<IncrementalReport, PipelineError> {
    let runner = IncrementalBuildRunner::new(registry, storage).with_options(options);
    let order = runner.plan()?;
    let sources = runner.required_sources(&order)?;
    let raw = RawLoader::new(storage).load(period, &sources)?;
    Ok(runner.run_planned(period, &raw, &order)?)
}

/// Build every period from `from` to `to` inclusive, oldest first.
///
/// Stops at the first failing period; earlier periods stay written.
pub fn build_period_range(
    registry: &TableRegistry,
    storage: &dyn StorageTier,
    from: Period,
    to: Period,
    options: IncrementalOptions,
) -> Result<Vec<IncrementalReport>, PipelineError> {
    if from > to {
        return Err(PipelineError::EmptyRange { from, to });
    }
    let periods = Period::range_inclusive(from, to);
    info!(%from, %to, periods = periods.len(), "building period range");

    periods
        .into_iter()
        .map(|period| build_period(registry, storage, period, options.clone()))
        .collect()
}

/// Rebuild aggregated tables and replace their objects.
pub fn build_aggregated(
    registry: &TableRegistry,
    storage: &dyn StorageTier,
    options: FullLoadOptions,
) -> Result<FullLoadReport, PipelineError> {
    let runner = FullLoadBuildRunner::new(registry, storage).with_options(options);
    Ok(runner.run()?)
}

/// Raw extracts of one period against what the planned tables read.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCheck {
    pub period: Period,
    pub available: Vec<String>,
    pub missing: Vec<String>,
}

impl SourceCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare the raw tier of `period` with the sources the planned tables need.
pub fn check_sources(
    registry: &TableRegistry,
    storage: &dyn StorageTier,
    period: Period,
    options: IncrementalOptions,
) -> Result<SourceCheck, PipelineError> {
    let runner = IncrementalBuildRunner::new(registry, storage).with_options(options);
    let order = runner.plan()?;
    let required = runner.required_sources(&order)?;
    let available = RawLoader::new(storage).available_sources(period)?;
    let missing = required
        .iter()
        .filter(|name| !available.iter().any(|a| a.as_str() == **name))
        .map(|name| name.to_string())
        .collect();
    Ok(SourceCheck {
        period,
        available,
        missing,
    })
}
