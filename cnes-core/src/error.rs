//! Build error taxonomy.
//!
//! Registry misconfiguration (`UnknownTable`, `UnknownDependency`, `InvalidDependency`,
//! `CycleDetected`) is detected before any I/O. `MissingInput` and `SchemaViolation` stop
//! the run at the failing table. Unreadable partitions and reference misses are not errors:
//! they are recovered inside the full-load context and surface in run statistics.

use polars::prelude::PolarsError;
use thiserror::Error;

use crate::frame::FrameError;
use crate::storage::StorageError;
use crate::table::TableTier;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("table '{0}' is already registered")]
    DuplicateName(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("table '{table}' depends on unknown table '{dependency}'")]
    UnknownDependency { table: String, dependency: String },

    #[error("table '{table}' depends on '{dependency}', which is not a curated-tier table")]
    InvalidDependency { table: String, dependency: String },

    #[error("table '{table}' is declared {declared} but its builder is {builder}")]
    KindMismatch {
        table: String,
        declared: TableTier,
        builder: &'static str,
    },

    #[error("table '{table}' is not a {expected} table")]
    WrongTier { table: String, expected: TableTier },

    #[error("dependency cycle detected at table '{table}'")]
    CycleDetected { table: String },

    #[error("table '{table}': missing input '{input}'")]
    MissingInput { table: String, input: String },

    #[error("table '{table}': schema violation: {reason}")]
    SchemaViolation { table: String, reason: String },

    #[error("table '{table}': storage error: {source}")]
    Storage {
        table: String,
        #[source]
        source: StorageError,
    },

    #[error("table '{table}': frame error: {source}")]
    Frame {
        table: String,
        #[source]
        source: FrameError,
    },
}

impl BuildError {
    /// Attribute a polars failure to `table`.
    ///
    /// Missing columns are data-shape problems and become `SchemaViolation`;
    /// everything else stays a frame error.
    pub fn frame(table: &str, err: PolarsError) -> Self {
        match err {
            PolarsError::ColumnNotFound(msg) | PolarsError::SchemaFieldNotFound(msg) => {
                BuildError::SchemaViolation {
                    table: table.to_string(),
                    reason: format!("column not found: {msg}"),
                }
            }
            other => BuildError::Frame {
                table: table.to_string(),
                source: FrameError::Polars(other),
            },
        }
    }

    pub fn storage(table: &str, source: StorageError) -> Self {
        BuildError::Storage {
            table: table.to_string(),
            source,
        }
    }

    /// Name of the table the error is attributed to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            BuildError::DuplicateName(t) | BuildError::UnknownTable(t) => Some(t),
            BuildError::UnknownDependency { table, .. }
            | BuildError::InvalidDependency { table, .. }
            | BuildError::KindMismatch { table, .. }
            | BuildError::WrongTier { table, .. }
            | BuildError::CycleDetected { table }
            | BuildError::MissingInput { table, .. }
            | BuildError::SchemaViolation { table, .. }
            | BuildError::Storage { table, .. }
            | BuildError::Frame { table, .. } => Some(table),
        }
    }

    /// True for registry misconfiguration, which is always detected before any I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BuildError::DuplicateName(_)
                | BuildError::UnknownTable(_)
                | BuildError::UnknownDependency { .. }
                | BuildError::InvalidDependency { .. }
                | BuildError::KindMismatch { .. }
                | BuildError::WrongTier { .. }
                | BuildError::CycleDetected { .. }
        )
    }
}
