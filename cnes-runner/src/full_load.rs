//! Full rebuild of aggregated tables.
//!
//! Each aggregated table is recomputed from every curated period of its
//! dependencies and written to `{table}/data`, replacing the previous object.
//! Tables run in name order; results are cached so a later table may read an
//! earlier one through `FullLoadContext::cached`.

use chrono::Utc;
use cnes_core::frame::encode_parquet;
use cnes_core::paths::aggregated_object;
use cnes_core::{
    BuildCache, BuildError, FullLoadContext, StorageTier, TableRegistry, TableTier, Tier,
};
use tracing::{info, warn};

use crate::report::{FullLoadReport, TableOutcome, WrittenObject};

#[derive(Debug, Clone, Default)]
pub struct FullLoadOptions {
    /// Tables to rebuild. All aggregated tables when `None`.
    pub tables: Option<Vec<String>>,
    /// Build and report without writing.
    pub dry_run: bool,
}

pub struct FullLoadBuildRunner<'a> {
    registry: &'a TableRegistry,
    storage: &'a dyn StorageTier,
    options: FullLoadOptions,
}

impl<'a> FullLoadBuildRunner<'a> {
    pub fn new(registry: &'a TableRegistry, storage: &'a dyn StorageTier) -> Self {
        Self {
            registry,
            storage,
            options: FullLoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FullLoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Tables this run rebuilds, in run order.
    pub fn plan(&self) -> Result<Vec<String>, BuildError> {
        self.registry.validate()?;
        let mut targets = match &self.options.tables {
            Some(tables) => tables.clone(),
            None => self.registry.aggregated_names(),
        };
        targets.sort();
        targets.dedup();
        for name in &targets {
            if self.registry.get(name)?.tier() != TableTier::Aggregated {
                return Err(BuildError::WrongTier {
                    table: name.clone(),
                    expected: TableTier::Aggregated,
                });
            }
        }
        Ok(targets)
    }

    pub fn run(&self) -> Result<FullLoadReport, BuildError> {
        let order = self.plan()?;
        let started_at = Utc::now();
        info!(tables = order.len(), dry_run = self.options.dry_run, "full-load run started");

        let mut cache = BuildCache::new();
        let mut tables = Vec::with_capacity(order.len());
        for name in &order {
            tables.push(self.build_table(name, &mut cache)?);
        }

        info!(tables = tables.len(), "full-load run finished");
        Ok(FullLoadReport {
            dry_run: self.options.dry_run,
            started_at,
            finished_at: Utc::now(),
            tables,
        })
    }

    fn build_table(&self, name: &str, cache: &mut BuildCache) -> Result<TableOutcome, BuildError> {
        let def = self.registry.get(name)?;
        let builder = def.as_full_load().ok_or_else(|| BuildError::WrongTier {
            table: name.to_string(),
            expected: TableTier::Aggregated,
        })?;

        let (df, stats) = {
            let ctx = FullLoadContext::new(name, def.dependencies(), self.storage, cache);
            let df = builder.build(&ctx)?;
            (df, ctx.into_stats())
        };
        if !stats.skipped.is_empty() {
            warn!(
                table = name,
                skipped = stats.skipped.len(),
                "aggregated table built without some unreadable partitions"
            );
        }

        let object = if self.options.dry_run {
            None
        } else {
            let bytes = encode_parquet(&df).map_err(|source| BuildError::Frame {
                table: name.to_string(),
                source,
            })?;
            let path = aggregated_object(name);
            self.storage
                .put(Tier::Aggregated, &path, &bytes, true)
                .map_err(|e| BuildError::storage(name, e))?;
            Some(WrittenObject::new(Tier::Aggregated, path, &bytes))
        };

        let rows = df.height();
        info!(
            table = name,
            rows,
            partitions = stats.partitions_read,
            written = object.is_some(),
            "built aggregated table"
        );
        cache.insert(name, df);
        Ok(TableOutcome::aggregated(name, rows, stats, object))
    }
}
