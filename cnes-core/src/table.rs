//! Table definitions: a named transform, its dependencies, and how it builds.
//!
//! A table is either incremental (built once per period from raw inputs, written
//! to the curated tier) or full-load (rebuilt from every curated period, written
//! to the aggregated tier). The build variant is a tagged enum and is checked
//! against the declared tier at construction.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{FullLoadContext, IncrementalContext};
use crate::error::BuildError;
use crate::paths::Tier;

/// Tier a table writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableTier {
    Curated,
    Aggregated,
}

impl TableTier {
    pub fn storage_tier(&self) -> Tier {
        match self {
            TableTier::Curated => Tier::Curated,
            TableTier::Aggregated => Tier::Aggregated,
        }
    }
}

impl fmt::Display for TableTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_tier().as_str())
    }
}

/// Builds one curated table for one period.
pub trait IncrementalBuilder: Send + Sync {
    /// Raw source extracts this table reads (e.g. `tbMunicipio`).
    fn sources(&self) -> &[&'static str];

    /// Column holding the surrogate key. The runner enforces uniqueness on it.
    fn key_column(&self) -> &str;

    /// Build the curated record set for `ctx.period()`.
    fn build(&self, ctx: &IncrementalContext<'_>) -> Result<DataFrame, BuildError>;
}

/// Rebuilds one aggregated table from every curated period.
pub trait FullLoadBuilder: Send + Sync {
    fn build(&self, ctx: &FullLoadContext<'_>) -> Result<DataFrame, BuildError>;
}

/// The build variant of a table.
pub enum TableKind {
    Incremental(Box<dyn IncrementalBuilder>),
    FullLoad(Box<dyn FullLoadBuilder>),
}

impl TableKind {
    fn label(&self) -> &'static str {
        match self {
            TableKind::Incremental(_) => "incremental",
            TableKind::FullLoad(_) => "full-load",
        }
    }

    fn tier(&self) -> TableTier {
        match self {
            TableKind::Incremental(_) => TableTier::Curated,
            TableKind::FullLoad(_) => TableTier::Aggregated,
        }
    }
}

impl fmt::Debug for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
pub struct TableDefinition {
    name: String,
    dependencies: Vec<String>,
    tier: TableTier,
    kind: TableKind,
}

impl TableDefinition {
    /// Declare a table. Fails with `KindMismatch` when `tier` disagrees with the
    /// builder variant (curated tables build incrementally, aggregated tables
    /// build by full load).
    ///
    /// Repeated dependency names are collapsed, keeping first-seen order.
    pub fn new(
        name: impl Into<String>,
        tier: TableTier,
        dependencies: Vec<String>,
        kind: TableKind,
    ) -> Result<Self, BuildError> {
        let name = name.into();
        if kind.tier() != tier {
            return Err(BuildError::KindMismatch {
                table: name,
                declared: tier,
                builder: kind.label(),
            });
        }

        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        Ok(Self {
            name,
            dependencies: deps,
            tier,
            kind,
        })
    }

    pub fn incremental(
        name: impl Into<String>,
        dependencies: &[&str],
        builder: impl IncrementalBuilder + 'static,
    ) -> Result<Self, BuildError> {
        Self::new(
            name,
            TableTier::Curated,
            dependencies.iter().map(|d| d.to_string()).collect(),
            TableKind::Incremental(Box::new(builder)),
        )
    }

    pub fn full_load(
        name: impl Into<String>,
        dependencies: &[&str],
        builder: impl FullLoadBuilder + 'static,
    ) -> Result<Self, BuildError> {
        Self::new(
            name,
            TableTier::Aggregated,
            dependencies.iter().map(|d| d.to_string()).collect(),
            TableKind::FullLoad(Box::new(builder)),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn tier(&self) -> TableTier {
        self.tier
    }

    pub fn kind(&self) -> &TableKind {
        &self.kind
    }

    pub fn as_incremental(&self) -> Option<&dyn IncrementalBuilder> {
        match &self.kind {
            TableKind::Incremental(b) => Some(b.as_ref()),
            TableKind::FullLoad(_) => None,
        }
    }

    pub fn as_full_load(&self) -> Option<&dyn FullLoadBuilder> {
        match &self.kind {
            TableKind::FullLoad(b) => Some(b.as_ref()),
            TableKind::Incremental(_) => None,
        }
    }
}
