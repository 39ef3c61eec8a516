//! Per-period build of curated tables.
//!
//! A run plans its targets before touching storage: the registry is validated,
//! targets are checked to be curated tables and ordered so that every table
//! follows its dependencies. Each table is then built, its surrogate key is
//! enforced, the result is cached for later tables in the same run, and the
//! Parquet bytes are written to `{table}/period={P}/data`.
//!
//! A failing table stops the run. Partitions already written stay in place.

use chrono::Utc;
use cnes_core::frame::{dedup_by_key, encode_parquet, require_columns};
use cnes_core::paths::curated_object;
use cnes_core::{
    BuildCache, BuildError, DependencyResolver, IncrementalContext, Period, RawInputs,
    StorageTier, TableRegistry, TableTier, Tier,
};
use tracing::{info, warn};

use crate::report::{IncrementalReport, TableOutcome, WrittenObject};

#[derive(Debug, Clone, Default)]
pub struct IncrementalOptions {
    /// Tables to build (plus their dependencies). All curated tables when `None`.
    pub tables: Option<Vec<String>>,
    /// Build and report without writing.
    pub dry_run: bool,
}

pub struct IncrementalBuildRunner<'a> {
    registry: &'a TableRegistry,
    storage: &'a dyn StorageTier,
    options: IncrementalOptions,
}

impl<'a> IncrementalBuildRunner<'a> {
    pub fn new(registry: &'a TableRegistry, storage: &'a dyn StorageTier) -> Self {
        Self {
            registry,
            storage,
            options: IncrementalOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IncrementalOptions) -> Self {
        self.options = options;
        self
    }

    /// Build order for this run. Fails on any registry misconfiguration.
    pub fn plan(&self) -> Result<Vec<String>, BuildError> {
        self.registry.validate()?;
        let targets = match &self.options.tables {
            Some(tables) => tables.clone(),
            None => self.registry.curated_names(),
        };
        for name in &targets {
            if self.registry.get(name)?.tier() != TableTier::Curated {
                return Err(BuildError::WrongTier {
                    table: name.clone(),
                    expected: TableTier::Curated,
                });
            }
        }
        DependencyResolver::new(self.registry).order(&targets)
    }

    /// Raw extracts read by the tables in `order`, sorted and unique.
    pub fn required_sources(&self, order: &[String]) -> Result<Vec<&'static str>, BuildError> {
        let mut sources = Vec::new();
        for name in order {
            let def = self.registry.get(name)?;
            if let Some(builder) = def.as_incremental() {
                sources.extend_from_slice(builder.sources());
            }
        }
        sources.sort_unstable();
        sources.dedup();
        Ok(sources)
    }

    /// Build every planned table for `period` from `raw`.
    pub fn run(&self, period: Period, raw: &RawInputs) -> Result<IncrementalReport, BuildError> {
        let order = self.plan()?;
        self.run_planned(period, raw, &order)
    }

    /// Build `order` (as returned by [`plan`](Self::plan)) for `period`.
    pub fn run_planned(
        &self,
        period: Period,
        raw: &RawInputs,
        order: &[String],
    ) -> Result<IncrementalReport, BuildError> {
        let started_at = Utc::now();
        info!(%period, tables = order.len(), dry_run = self.options.dry_run, "incremental run started");

        let mut cache = BuildCache::new();
        let mut tables = Vec::with_capacity(order.len());
        for name in order {
            tables.push(self.build_table(name, period, raw, &mut cache)?);
        }

        info!(%period, tables = tables.len(), "incremental run finished");
        Ok(IncrementalReport {
            period,
            dry_run: self.options.dry_run,
            started_at,
            finished_at: Utc::now(),
            tables,
        })
    }

    fn build_table(
        &self,
        name: &str,
        period: Period,
        raw: &RawInputs,
        cache: &mut BuildCache,
    ) -> Result<TableOutcome, BuildError> {
        let def = self.registry.get(name)?;
        let builder = def.as_incremental().ok_or_else(|| BuildError::WrongTier {
            table: name.to_string(),
            expected: TableTier::Curated,
        })?;

        let built = {
            let ctx = IncrementalContext::new(name, def.dependencies(), period, raw, cache);
            builder.build(&ctx)?
        };

        let key = builder.key_column();
        require_columns(name, &built, &[key])?;
        let (df, dropped) = dedup_by_key(built, key).map_err(|e| BuildError::frame(name, e))?;
        if dropped > 0 {
            warn!(table = name, %period, dropped, key, "collapsed duplicate surrogate keys");
        }

        let object = if self.options.dry_run {
            None
        } else {
            let bytes = encode_parquet(&df).map_err(|source| BuildError::Frame {
                table: name.to_string(),
                source,
            })?;
            let path = curated_object(name, period);
            self.storage
                .put(Tier::Curated, &path, &bytes, true)
                .map_err(|e| BuildError::storage(name, e))?;
            Some(WrittenObject::new(Tier::Curated, path, &bytes))
        };

        let rows = df.height();
        info!(table = name, %period, rows, written = object.is_some(), "built curated table");
        cache.insert(name, df);
        Ok(TableOutcome::curated(name, rows, dropped, object))
    }
}
