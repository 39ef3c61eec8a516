use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ESTABELECIMENTOS;
use crate::context::FullLoadContext;
use crate::error::BuildError;
use crate::frame::{collect, empty_frame, require_columns, surrogate_key};
use crate::paths::Tier;
use crate::table::FullLoadBuilder;

const MUNICIPIO: &str = "CO_MUNICIPIO_SEM_DIGITO";
const YYYY: &str = "YYYY";
const MM: &str = "MM";
const TOTAL: &str = "TOTAL_PROFISSIONAIS";
const POPULACAO_MENSAL: &str = "POPULACAO_MENSAL";
const POR_1000: &str = "PROFISSIONAIS_POR_1000";
const SK: &str = "sk";

const GROUP_KEY: [&str; 3] = [MUNICIPIO, YYYY, MM];

/// Descriptive population columns carried through when present.
const REFERENCE_EXTRAS: [&str; 7] = [
    "CO_UF",
    "NO_UF",
    "NO_REGIAO",
    "NO_MUNICIPIO_IBGE",
    "POPULACAO",
    "GROWTH_ABS",
    "GROWTH_PCT",
];

/// Where the monthly population dataset lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSource {
    pub tier: Tier,
    pub path: String,
}

impl Default for ReferenceSource {
    fn default() -> Self {
        Self {
            tier: Tier::Aggregated,
            path: "populacao/data".to_string(),
        }
    }
}

/// SUS physicians per 1000 inhabitants, per São Paulo municipality and month.
///
/// Distinct `CO_PROFISSIONAL_SUS` whose activity starts with `MEDICO` are counted
/// per (municipality, year, month) over every curated `estabelecimentos`
/// period, then left-joined with the population reference. Rows without a
/// usable population keep a null metric.
pub struct EstabelecimentosMetricasSp {
    reference: ReferenceSource,
}

impl EstabelecimentosMetricasSp {
    pub fn new(reference: ReferenceSource) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &ReferenceSource {
        &self.reference
    }
}

impl FullLoadBuilder for EstabelecimentosMetricasSp {
    fn build(&self, ctx: &FullLoadContext<'_>) -> Result<DataFrame, BuildError> {
        let table = ctx.table();
        let counts = physician_counts(ctx)?;
        let population = load_population(ctx, &self.reference)?;

        let per_1000 = when(col(POPULACAO_MENSAL).gt(lit(0.0)))
            .then(col(TOTAL).cast(DataType::Float64) / col(POPULACAO_MENSAL) * lit(1000.0))
            .otherwise(lit(NULL).cast(DataType::Float64));

        let key_exprs = GROUP_KEY.map(col);
        let lf = counts
            .lazy()
            .join(
                population.lazy(),
                key_exprs.clone(),
                key_exprs,
                JoinArgs::new(JoinType::Left),
            )
            .with_columns([per_1000.alias(POR_1000), surrogate_key(&GROUP_KEY).alias(SK)])
            .sort(
                GROUP_KEY,
                SortMultipleOptions::default().with_maintain_order(true),
            );
        let out = collect(table, lf)?;

        let misses = out
            .column(POPULACAO_MENSAL)
            .map_err(|e| BuildError::frame(table, e))?
            .null_count();
        if misses > 0 {
            warn!(
                table,
                rows = misses,
                "no population for some municipality-months, metric left null"
            );
            ctx.record_reference_misses(misses);
        }
        Ok(out)
    }
}

/// Distinct physician count per group, summed across partitions.
fn physician_counts(ctx: &FullLoadContext<'_>) -> Result<DataFrame, BuildError> {
    let table = ctx.table();
    let mut per_partition: Vec<LazyFrame> = Vec::new();

    for (period, df) in ctx.partitions(ESTABELECIMENTOS)? {
        require_columns(
            table,
            &df,
            &[
                "CO_SIGLA_ESTADO",
                "TP_SUS_NAO_SUS",
                "DS_ATIVIDADE_PROFISSIONAL",
                "CO_MUNICIPIO",
                "CO_PROFISSIONAL_SUS",
            ],
        )?;

        let is_target = col("CO_SIGLA_ESTADO")
            .cast(DataType::String)
            .eq(lit("SP"))
            .and(col("TP_SUS_NAO_SUS").cast(DataType::String).eq(lit("S")))
            .and(
                col("DS_ATIVIDADE_PROFISSIONAL")
                    .cast(DataType::String)
                    .str()
                    .starts_with(lit("MEDICO")),
            );

        let lf = df
            .lazy()
            .filter(is_target)
            .with_columns([
                col("CO_MUNICIPIO").cast(DataType::Int64).alias(MUNICIPIO),
                lit(period.year()).alias(YYYY),
                lit(period.month() as i32).alias(MM),
            ])
            .filter(
                col(MUNICIPIO)
                    .is_not_null()
                    .and(col("CO_PROFISSIONAL_SUS").is_not_null()),
            )
            .group_by(GROUP_KEY.map(col))
            .agg([col("CO_PROFISSIONAL_SUS")
                .n_unique()
                .cast(DataType::Int64)
                .alias(TOTAL)]);

        // Collect each partition on its own so only the small group counts stay resident.
        let counted = collect(table, lf)?;
        debug!(table, %period, groups = counted.height(), "counted physicians");
        per_partition.push(counted.lazy());
    }

    if per_partition.is_empty() {
        return Ok(empty_frame(&[
            (MUNICIPIO, DataType::Int64),
            (YYYY, DataType::Int32),
            (MM, DataType::Int32),
            (TOTAL, DataType::Int64),
        ]));
    }

    let stacked = concat(per_partition, UnionArgs::default()).map_err(|e| BuildError::frame(table, e))?;
    collect(
        table,
        stacked
            .group_by(GROUP_KEY.map(col))
            .agg([col(TOTAL).sum()]),
    )
}

/// Read and normalise the population reference to one row per group key.
fn load_population(
    ctx: &FullLoadContext<'_>,
    reference: &ReferenceSource,
) -> Result<DataFrame, BuildError> {
    let table = ctx.table();
    let pop = ctx.reference(reference.tier, &reference.path)?;

    let municipio = if pop.get_column_index(MUNICIPIO).is_some() {
        MUNICIPIO
    } else {
        "CO_MUNICIPIO"
    };
    require_columns(table, &pop, &[municipio, YYYY, MM])?;

    let population = if pop.get_column_index(POPULACAO_MENSAL).is_some() {
        col(POPULACAO_MENSAL)
    } else if pop.get_column_index("POPULACAO").is_some() {
        col("POPULACAO")
    } else {
        return Err(BuildError::SchemaViolation {
            table: table.to_string(),
            reason: format!("population reference needs {POPULACAO_MENSAL} or POPULACAO"),
        });
    };

    let mut keep = vec![
        col(municipio).cast(DataType::Int64).alias(MUNICIPIO),
        col(YYYY).cast(DataType::Int32),
        col(MM).cast(DataType::Int32),
        population.cast(DataType::Float64).alias(POPULACAO_MENSAL),
    ];
    keep.extend(
        REFERENCE_EXTRAS
            .iter()
            .filter(|c| pop.get_column_index(c).is_some())
            .map(|c| col(*c)),
    );

    let pop = collect(
        table,
        pop.lazy()
            .select(keep)
            .unique_stable(None, UniqueKeepStrategy::First),
    )?;

    let distinct_keys = collect(
        table,
        pop.clone()
            .lazy()
            .select(GROUP_KEY.map(col))
            .unique(None, UniqueKeepStrategy::Any),
    )?
    .height();
    if distinct_keys != pop.height() {
        return Err(BuildError::SchemaViolation {
            table: table.to_string(),
            reason: format!(
                "population reference has {} conflicting rows for the same municipality-month",
                pop.height() - distinct_keys
            ),
        });
    }
    Ok(pop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BuildCache;
    use crate::frame::encode_parquet;
    use crate::paths::{aggregated_object, curated_object};
    use crate::period::Period;
    use crate::storage::{MemoryStorage, StorageTier};

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn partition(rows: &[(&str, &str, &str, &str, &str)]) -> Vec<u8> {
        let df = df!(
            "CO_SIGLA_ESTADO" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "TP_SUS_NAO_SUS" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            "DS_ATIVIDADE_PROFISSIONAL" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            "CO_MUNICIPIO" => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
            "CO_PROFISSIONAL_SUS" => rows.iter().map(|r| r.4).collect::<Vec<_>>()
        )
        .unwrap();
        encode_parquet(&df).unwrap()
    }

    fn seed(storage: &MemoryStorage) {
        storage
            .put(
                Tier::Curated,
                &curated_object(ESTABELECIMENTOS, p("202401")),
                &partition(&[
                    ("SP", "S", "MEDICO CLINICO", "355030", "p1"),
                    ("SP", "S", "MEDICO PEDIATRA", "355030", "p1"),
                    ("SP", "S", "MEDICO CLINICO", "355030", "p2"),
                    ("SP", "N", "MEDICO CLINICO", "355030", "p3"),
                    ("SP", "S", "ENFERMEIRO", "355030", "p4"),
                    ("RJ", "S", "MEDICO CLINICO", "330455", "p5"),
                    ("SP", "S", "MEDICO CLINICO", "350950", "p6"),
                ]),
                true,
            )
            .unwrap();
        storage
            .put(
                Tier::Curated,
                &curated_object(ESTABELECIMENTOS, p("202402")),
                &partition(&[("SP", "S", "MEDICO CLINICO", "355030", "p1")]),
                true,
            )
            .unwrap();
    }

    fn population(storage: &MemoryStorage) {
        let pop = df!(
            "CO_MUNICIPIO" => &[355030i64, 355030],
            "YYYY" => &[2024i32, 2024],
            "MM" => &[1i32, 2],
            "POPULACAO" => &[2000.0f64, 0.0],
            "NO_MUNICIPIO_IBGE" => &["São Paulo", "São Paulo"]
        )
        .unwrap();
        storage
            .put(
                Tier::Aggregated,
                &aggregated_object("populacao"),
                &encode_parquet(&pop).unwrap(),
                true,
            )
            .unwrap();
    }

    fn run(storage: &MemoryStorage) -> (DataFrame, crate::context::FullLoadStats) {
        let deps = vec![ESTABELECIMENTOS.to_string()];
        let cache = BuildCache::new();
        let ctx = FullLoadContext::new("estabelecimentos_metricas_sp", &deps, storage, &cache);
        let out = EstabelecimentosMetricasSp::new(ReferenceSource::default())
            .build(&ctx)
            .unwrap();
        (out, ctx.into_stats())
    }

    #[test]
    fn counts_distinct_physicians_and_derives_rate() {
        let storage = MemoryStorage::new();
        seed(&storage);
        population(&storage);
        let (out, stats) = run(&storage);

        // (355030, 2024, 1), (355030, 2024, 2), (350950, 2024, 1); sorted by municipality.
        assert_eq!(out.height(), 3);
        let mun: Vec<Option<i64>> = out.column(MUNICIPIO).unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(mun, vec![Some(350950), Some(355030), Some(355030)]);

        let totals: Vec<Option<i64>> = out.column(TOTAL).unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(totals, vec![Some(1), Some(2), Some(1)]);

        let rate: Vec<Option<f64>> = out.column(POR_1000).unwrap().f64().unwrap().into_iter().collect();
        // No population row for 350950, zero population for February.
        assert_eq!(rate, vec![None, Some(1.0), None]);

        let sk: Vec<Option<&str>> = out.column(SK).unwrap().str().unwrap().into_iter().collect();
        assert_eq!(sk[1], Some("355030_2024_1"));

        assert!(out.column("NO_MUNICIPIO_IBGE").is_ok());
        assert_eq!(stats.partitions_read, 2);
        assert_eq!(stats.reference_misses, 1);
    }

    #[test]
    fn population_key_may_be_named_either_way() {
        let mut results = Vec::new();
        for key in ["CO_MUNICIPIO", MUNICIPIO] {
            let storage = MemoryStorage::new();
            seed(&storage);
            let pop = df!(
                key => &["355030"],
                "YYYY" => &[2024i64],
                "MM" => &[1i64],
                "POPULACAO_MENSAL" => &[4000.0f64]
            )
            .unwrap();
            storage
                .put(
                    Tier::Aggregated,
                    &aggregated_object("populacao"),
                    &encode_parquet(&pop).unwrap(),
                    true,
                )
                .unwrap();
            let (out, stats) = run(&storage);
            assert!(out.column("CO_MUNICIPIO").is_err());
            let rate: Vec<Option<f64>> =
                out.column(POR_1000).unwrap().f64().unwrap().into_iter().collect();
            assert_eq!(rate, vec![None, Some(0.5), None]);
            assert_eq!(stats.reference_misses, 2);
            results.push(out);
        }
        assert!(results[0].equals_missing(&results[1]));
    }

    #[test]
    fn zero_partitions_yield_typed_empty_frame() {
        let storage = MemoryStorage::new();
        population(&storage);
        let (out, stats) = run(&storage);

        assert_eq!(out.height(), 0);
        assert_eq!(out.column(MUNICIPIO).unwrap().dtype(), &DataType::Int64);
        assert_eq!(out.column(POR_1000).unwrap().dtype(), &DataType::Float64);
        assert_eq!(stats.partitions_read, 0);
    }

    #[test]
    fn missing_population_reference_is_missing_input() {
        let storage = MemoryStorage::new();
        seed(&storage);
        let deps = vec![ESTABELECIMENTOS.to_string()];
        let cache = BuildCache::new();
        let ctx = FullLoadContext::new("estabelecimentos_metricas_sp", &deps, &storage, &cache);
        let err = EstabelecimentosMetricasSp::new(ReferenceSource::default())
            .build(&ctx)
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingInput { .. }));
    }

    #[test]
    fn population_without_count_column_is_schema_violation() {
        let storage = MemoryStorage::new();
        let pop = df!("CO_MUNICIPIO" => &[1i64], "YYYY" => &[2024i32], "MM" => &[1i32]).unwrap();
        storage
            .put(
                Tier::Aggregated,
                &aggregated_object("populacao"),
                &encode_parquet(&pop).unwrap(),
                true,
            )
            .unwrap();
        let deps = vec![ESTABELECIMENTOS.to_string()];
        let cache = BuildCache::new();
        let ctx = FullLoadContext::new("estabelecimentos_metricas_sp", &deps, &storage, &cache);
        assert!(matches!(
            EstabelecimentosMetricasSp::new(ReferenceSource::default()).build(&ctx),
            Err(BuildError::SchemaViolation { .. })
        ));
    }
}
