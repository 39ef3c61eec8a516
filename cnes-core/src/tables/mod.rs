//! Built-in CNES tables and the routine that registers them.
//!
//! Curated (per period):
//! - `servicos`: specialised services offered by São Paulo establishments
//! - `estabelecimentos`: SUS professionals working at São Paulo establishments
//!
//! Aggregated (full load):
//! - `estabelecimentos_metricas_sp`: SUS physicians per 1000 inhabitants by
//!   municipality and month

mod estabelecimentos;
mod metricas;
mod servicos;

pub use estabelecimentos::Estabelecimentos;
pub use metricas::{EstabelecimentosMetricasSp, ReferenceSource};
pub use servicos::Servicos;

use polars::prelude::*;

use crate::error::BuildError;
use crate::registry::TableRegistry;
use crate::table::TableDefinition;

pub const SERVICOS: &str = "servicos";
pub const ESTABELECIMENTOS: &str = "estabelecimentos";
pub const ESTABELECIMENTOS_METRICAS_SP: &str = "estabelecimentos_metricas_sp";

/// Raw extract names, as they appear in `{period}/{source}{period}`.
pub mod sources {
    pub const ESTABELECIMENTO: &str = "tbEstabelecimento";
    pub const MUNICIPIO: &str = "tbMunicipio";
    pub const SERVICO_CLASSIFICACAO: &str = "rlEstabServClass";
    pub const CLASSIFICACAO_SERVICO: &str = "tbClassificacaoServico";
    pub const CARGA_HORARIA_SUS: &str = "tbCargaHorariaSus";
    pub const ATIVIDADE_PROFISSIONAL: &str = "tbAtividadeProfissional";
    pub const DADOS_PROFISSIONAL_SUS: &str = "tbDadosProfissionalSus";
}

/// Surrogate key column of the curated tables.
pub const SK_REGISTRO: &str = "SK_REGISTRO";
/// Period column of the curated tables, `YYYYMM` as text.
pub const YYYYMM: &str = "YYYYMM";

/// IBGE code of the state of São Paulo in `CO_ESTADO_GESTOR`.
const SAO_PAULO_STATE_CODE: i64 = 35;

/// Register every built-in table.
pub fn register_all(
    registry: &mut TableRegistry,
    reference: ReferenceSource,
) -> Result<(), BuildError> {
    registry.register(TableDefinition::incremental(SERVICOS, &[], Servicos)?)?;
    registry.register(TableDefinition::incremental(
        ESTABELECIMENTOS,
        &[],
        Estabelecimentos,
    )?)?;
    registry.register(TableDefinition::full_load(
        ESTABELECIMENTOS_METRICAS_SP,
        &[ESTABELECIMENTOS],
        EstabelecimentosMetricasSp::new(reference),
    )?)?;
    Ok(())
}

/// A validated registry holding every built-in table.
pub fn default_registry(reference: ReferenceSource) -> Result<TableRegistry, BuildError> {
    let mut registry = TableRegistry::new();
    register_all(&mut registry, reference)?;
    registry.validate()?;
    Ok(registry)
}

/// Establishments managed by São Paulo, joined with their managing municipality.
///
/// `CO_MUNICIPIO` from the municipality extract is kept alongside
/// `CO_MUNICIPIO_GESTOR`; clashing municipality columns get a `_mun` suffix.
pub(crate) fn sp_establishments(estabelecimento: &DataFrame, municipio: &DataFrame) -> LazyFrame {
    let estab_sp = estabelecimento.clone().lazy().filter(
        col("CO_ESTADO_GESTOR")
            .cast(DataType::Int64)
            .eq(lit(SAO_PAULO_STATE_CODE)),
    );
    let municipio = municipio
        .clone()
        .lazy()
        .with_column(col("CO_MUNICIPIO").alias("CO_MUNICIPIO_GESTOR"));

    estab_sp.join(
        municipio,
        [col("CO_MUNICIPIO_GESTOR")],
        [col("CO_MUNICIPIO_GESTOR")],
        JoinArgs::new(JoinType::Inner).with_suffix(Some("_mun".into())),
    )
}
