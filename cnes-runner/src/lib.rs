//! CNES Runner: build orchestration over the `cnes-core` tables.
//!
//! This crate builds on `cnes-core` to provide:
//! - Raw CSV loading with Latin-1 fallback
//! - The incremental (per period, curated tier) runner
//! - The full-load (aggregated tier) runner
//! - Pipeline entry points for one period, a period range and aggregation
//! - TOML configuration and JSON run reports

pub mod config;
pub mod full_load;
pub mod incremental;
pub mod pipeline;
pub mod raw_loader;
pub mod report;

pub use config::{ConfigError, PipelineConfig};
pub use full_load::{FullLoadBuildRunner, FullLoadOptions};
pub use incremental::{IncrementalBuildRunner, IncrementalOptions};
pub use pipeline::{
    build_aggregated, build_period, build_period_range, check_sources, PipelineError, SourceCheck,
};
pub use raw_loader::{parse_csv, LoadError, RawLoader};
pub use report::{FullLoadReport, IncrementalReport, RunReport, TableOutcome, WrittenObject};
