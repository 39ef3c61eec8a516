//! Inputs handed to table builders.
//!
//! - `RawInputs`: parsed raw extracts for one period
//! - `IncrementalContext`: what an incremental builder may read
//! - `FullLoadContext`: lazy curated partitions, the run cache and reference reads
//!   for a full-load builder

use polars::prelude::DataFrame;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::vec;
use tracing::{debug, warn};

use crate::cache::BuildCache;
use crate::error::BuildError;
use crate::frame::decode_parquet;
use crate::partition::{list_partitions, Partition};
use crate::paths::Tier;
use crate::period::Period;
use crate::storage::StorageTier;

/// Raw source name → parsed extract, for one period.
#[derive(Debug, Default, Clone)]
pub struct RawInputs {
    frames: HashMap<String, DataFrame>,
}

impl RawInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, df: DataFrame) {
        self.frames.insert(source.into(), df);
    }

    pub fn get(&self, source: &str) -> Option<&DataFrame> {
        self.frames.get(source)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.frames.contains_key(source)
    }

    /// Loaded source names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.frames.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<(String, DataFrame)> for RawInputs {
    fn from_iter<I: IntoIterator<Item = (String, DataFrame)>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

// ── Incremental ─────────────────────────────────────────────────────

pub struct IncrementalContext<'a> {
    table: &'a str,
    dependencies: &'a [String],
    period: Period,
    raw: &'a RawInputs,
    cache: &'a BuildCache,
}

impl<'a> IncrementalContext<'a> {
    pub fn new(
        table: &'a str,
        dependencies: &'a [String],
        period: Period,
        raw: &'a RawInputs,
        cache: &'a BuildCache,
    ) -> Self {
        Self {
            table,
            dependencies,
            period,
            raw,
            cache,
        }
    }

    pub fn table(&self) -> &'a str {
        self.table
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// A raw extract, or `MissingInput` if it was not loaded for this period.
    pub fn raw(&self, source: &str) -> Result<&'a DataFrame, BuildError> {
        self.raw.get(source).ok_or_else(|| BuildError::MissingInput {
            table: self.table.to_string(),
            input: source.to_string(),
        })
    }

    /// The output of a declared dependency built earlier in this run.
    pub fn dependency(&self, table: &str) -> Result<&'a DataFrame, BuildError> {
        if !self.dependencies.iter().any(|d| d == table) {
            return Err(BuildError::UnknownDependency {
                table: self.table.to_string(),
                dependency: table.to_string(),
            });
        }
        self.cache.get(table).ok_or_else(|| BuildError::MissingInput {
            table: self.table.to_string(),
            input: table.to_string(),
        })
    }
}

// ── Full load ───────────────────────────────────────────────────────

/// A curated partition that could not be read and was left out of a full load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPartition {
    pub table: String,
    pub period: Period,
    pub path: String,
    pub reason: String,
}

/// What happened while a full-load builder pulled its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullLoadStats {
    pub partitions_read: usize,
    pub skipped: Vec<SkippedPartition>,
    /// Output rows with no matching reference row (metric left null).
    pub reference_misses: usize,
}

pub struct FullLoadContext<'a> {
    table: &'a str,
    dependencies: &'a [String],
    storage: &'a dyn StorageTier,
    cache: &'a BuildCache,
    stats: RefCell<FullLoadStats>,
}

impl<'a> FullLoadContext<'a> {
    pub fn new(
        table: &'a str,
        dependencies: &'a [String],
        storage: &'a dyn StorageTier,
        cache: &'a BuildCache,
    ) -> Self {
        Self {
            table,
            dependencies,
            storage,
            cache,
            stats: RefCell::new(FullLoadStats::default()),
        }
    }

    pub fn table(&self) -> &'a str {
        self.table
    }

    /// Result of another aggregated table completed earlier in this run.
    pub fn cached(&self, table: &str) -> Option<&'a DataFrame> {
        self.cache.get(table)
    }

    /// Lazily stream the curated partitions of a declared dependency, oldest first.
    ///
    /// Nothing is read until the stream is advanced; each step reads one partition.
    pub fn partitions(&self, dependency: &str) -> Result<PartitionStream<'_, 'a>, BuildError> {
        if !self.dependencies.iter().any(|d| d == dependency) {
            return Err(BuildError::UnknownDependency {
                table: self.table.to_string(),
                dependency: dependency.to_string(),
            });
        }
        let parts = list_partitions(self.storage, Tier::Curated, dependency)
            .map_err(|e| BuildError::storage(self.table, e))?;
        debug!(
            table = self.table,
            dependency,
            partitions = parts.len(),
            "discovered curated partitions"
        );
        Ok(PartitionStream {
            ctx: self,
            pending: parts.into_iter(),
        })
    }

    /// Read a single reference object (e.g. population by month).
    pub fn reference(&self, tier: Tier, path: &str) -> Result<DataFrame, BuildError> {
        let bytes = self.storage.get(tier, path).map_err(|e| {
            if e.is_not_found() {
                BuildError::MissingInput {
                    table: self.table.to_string(),
                    input: format!("{tier}:{path}"),
                }
            } else {
                BuildError::storage(self.table, e)
            }
        })?;
        decode_parquet(&bytes).map_err(|source| BuildError::Frame {
            table: self.table.to_string(),
            source,
        })
    }

    pub fn record_reference_misses(&self, count: usize) {
        self.stats.borrow_mut().reference_misses += count;
    }

    pub fn stats(&self) -> FullLoadStats {
        self.stats.borrow().clone()
    }

    pub fn into_stats(self) -> FullLoadStats {
        self.stats.into_inner()
    }

    fn read_partition(&self, path: &str) -> Result<DataFrame, String> {
        let bytes = self
            .storage
            .get(Tier::Curated, path)
            .map_err(|e| e.to_string())?;
        decode_parquet(&bytes).map_err(|e| e.to_string())
    }
}

/// Iterator over `(period, frame)` for one curated dependency.
///
/// Unreadable partitions (zero-byte, corrupt, vanished) are logged, recorded in
/// the context's stats and skipped.
pub struct PartitionStream<'c, 'a> {
    ctx: &'c FullLoadContext<'a>,
    pending: vec::IntoIter<Partition>,
}

impl PartitionStream<'_, '_> {
    /// Partitions not yet visited.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for PartitionStream<'_, '_> {
    type Item = (Period, DataFrame);

    fn next(&mut self) -> Option<Self::Item> {
        for part in self.pending.by_ref() {
            let Some(period) = part.period else {
                continue;
            };
            match self.ctx.read_partition(&part.path) {
                Ok(df) => {
                    self.ctx.stats.borrow_mut().partitions_read += 1;
                    debug!(path = %part.path, rows = df.height(), "read partition");
                    return Some((period, df));
                }
                Err(reason) => {
                    warn!(
                        table = self.ctx.table,
                        path = %part.path,
                        %reason,
                        "skipping unreadable partition"
                    );
                    self.ctx.stats.borrow_mut().skipped.push(SkippedPartition {
                        table: self.ctx.table.to_string(),
                        period,
                        path: part.path,
                        reason,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_parquet;
    use crate::paths::curated_object;
    use crate::storage::MemoryStorage;
    use polars::prelude::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn incremental_context_reports_missing_raw_input() {
        let raw = RawInputs::new();
        let cache = BuildCache::new();
        let ctx = IncrementalContext::new("servicos", &[], p("202401"), &raw, &cache);
        let err = ctx.raw("tbMunicipio").unwrap_err();
        assert!(
            matches!(err, BuildError::MissingInput { ref table, ref input } if table == "servicos" && input == "tbMunicipio")
        );
    }

    #[test]
    fn incremental_context_only_exposes_declared_dependencies() {
        let raw = RawInputs::new();
        let mut cache = BuildCache::new();
        cache.insert("a", DataFrame::empty());
        cache.insert("other", DataFrame::empty());
        let deps = vec!["a".to_string()];
        let ctx = IncrementalContext::new("b", &deps, p("202401"), &raw, &cache);
        assert!(ctx.dependency("a").is_ok());
        assert!(matches!(
            ctx.dependency("other"),
            Err(BuildError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn partition_stream_skips_corrupt_entries_and_counts_them() {
        let storage = MemoryStorage::new();
        let good = encode_parquet(&df!("x" => &[1i64, 2]).unwrap()).unwrap();
        storage
            .put(Tier::Curated, &curated_object("dep", p("202401")), &good, true)
            .unwrap();
        storage
            .put(Tier::Curated, &curated_object("dep", p("202402")), &[], true)
            .unwrap();
        storage
            .put(Tier::Curated, &curated_object("dep", p("202403")), &good, true)
            .unwrap();

        let deps = vec!["dep".to_string()];
        let cache = BuildCache::new();
        let ctx = FullLoadContext::new("agg", &deps, &storage, &cache);

        let periods: Vec<Period> = ctx.partitions("dep").unwrap().map(|(p, _)| p).collect();
        assert_eq!(periods, vec![p("202401"), p("202403")]);

        let stats = ctx.into_stats();
        assert_eq!(stats.partitions_read, 2);
        assert_eq!(stats.skipped.len(), 1);
        assert_eq!(stats.skipped[0].period, p("202402"));
    }

    #[test]
    fn partition_stream_is_lazy() {
        let storage = MemoryStorage::new();
        let good = encode_parquet(&df!("x" => &[1i64]).unwrap()).unwrap();
        for period in ["202401", "202402"] {
            storage
                .put(Tier::Curated, &curated_object("dep", p(period)), &good, true)
                .unwrap();
        }
        let deps = vec!["dep".to_string()];
        let cache = BuildCache::new();
        let ctx = FullLoadContext::new("agg", &deps, &storage, &cache);

        let mut stream = ctx.partitions("dep").unwrap();
        assert_eq!(ctx.stats().partitions_read, 0);
        assert!(stream.next().is_some());
        assert_eq!(ctx.stats().partitions_read, 1);
        assert_eq!(stream.remaining(), 1);
    }

    #[test]
    fn undeclared_dependency_is_rejected() {
        let storage = MemoryStorage::new();
        let cache = BuildCache::new();
        let ctx = FullLoadContext::new("agg", &[], &storage, &cache);
        assert!(matches!(
            ctx.partitions("dep"),
            Err(BuildError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn missing_reference_is_missing_input() {
        let storage = MemoryStorage::new();
        let cache = BuildCache::new();
        let ctx = FullLoadContext::new("agg", &[], &storage, &cache);
        let err = ctx.reference(Tier::Aggregated, "populacao/data").unwrap_err();
        assert!(
            matches!(err, BuildError::MissingInput { ref input, .. } if input == "aggregated:populacao/data")
        );
    }
}
