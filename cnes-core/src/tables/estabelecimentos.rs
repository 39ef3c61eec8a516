use polars::prelude::*;

use super::{sources, sp_establishments, SK_REGISTRO, YYYYMM};
use crate::context::IncrementalContext;
use crate::error::BuildError;
use crate::frame::{collect, require_columns, surrogate_key};
use crate::table::IncrementalBuilder;

const OUTPUT_COLUMNS: [&str; 12] = [
    "CO_UNIDADE",
    "CO_PROFISSIONAL_SUS",
    "NO_PROFISSIONAL",
    "CO_CBO",
    "TP_SUS_NAO_SUS",
    "DS_ATIVIDADE_PROFISSIONAL",
    "NO_FANTASIA",
    "NO_BAIRRO",
    "NO_MUNICIPIO",
    "CO_MUNICIPIO",
    "CO_SIGLA_ESTADO",
    "CO_CEP",
];

/// Professionals with SUS workload at São Paulo establishments.
///
/// One row per (`CO_UNIDADE`, `CO_PROFISSIONAL_SUS`, `CO_CBO`), every column
/// as text, plus a geocodable `ds_localidade` ("CEP,MUNICIPIO,UF,Brasil").
pub struct Estabelecimentos;

impl IncrementalBuilder for Estabelecimentos {
    fn sources(&self) -> &[&'static str] {
        &[
            sources::ESTABELECIMENTO,
            sources::MUNICIPIO,
            sources::CARGA_HORARIA_SUS,
            sources::ATIVIDADE_PROFISSIONAL,
            sources::DADOS_PROFISSIONAL_SUS,
        ]
    }

    fn key_column(&self) -> &str {
        SK_REGISTRO
    }

    fn build(&self, ctx: &IncrementalContext<'_>) -> Result<DataFrame, BuildError> {
        let table = ctx.table();
        let estab = ctx.raw(sources::ESTABELECIMENTO)?;
        let mun = ctx.raw(sources::MUNICIPIO)?;
        let workload = ctx.raw(sources::CARGA_HORARIA_SUS)?;
        let activity = ctx.raw(sources::ATIVIDADE_PROFISSIONAL)?;
        let professional = ctx.raw(sources::DADOS_PROFISSIONAL_SUS)?;

        require_columns(
            table,
            estab,
            &["CO_UNIDADE", "CO_ESTADO_GESTOR", "CO_MUNICIPIO_GESTOR"],
        )?;
        require_columns(table, mun, &["CO_MUNICIPIO"])?;
        require_columns(
            table,
            workload,
            &["CO_UNIDADE", "CO_PROFISSIONAL_SUS", "CO_CBO"],
        )?;
        require_columns(table, activity, &["CO_CBO"])?;
        require_columns(table, professional, &["CO_PROFISSIONAL_SUS"])?;

        let joined = workload
            .clone()
            .lazy()
            .join(
                activity.clone().lazy(),
                [col("CO_CBO")],
                [col("CO_CBO")],
                JoinArgs::new(JoinType::Inner),
            )
            .join(
                sp_establishments(estab, mun),
                [col("CO_UNIDADE")],
                [col("CO_UNIDADE")],
                JoinArgs::new(JoinType::Inner),
            )
            .join(
                professional.clone().lazy(),
                [col("CO_PROFISSIONAL_SUS")],
                [col("CO_PROFISSIONAL_SUS")],
                JoinArgs::new(JoinType::Inner),
            );

        let lf = joined
            .select(OUTPUT_COLUMNS.map(|c| col(c).cast(DataType::String)))
            .with_columns([
                concat_str(
                    [
                        col("CO_CEP").fill_null(lit("")),
                        col("NO_MUNICIPIO").fill_null(lit("")),
                        col("CO_SIGLA_ESTADO").fill_null(lit("")),
                        lit("Brasil"),
                    ],
                    ",",
                    false,
                )
                .alias("ds_localidade"),
                surrogate_key(&["CO_UNIDADE", "CO_PROFISSIONAL_SUS", "CO_CBO"]).alias(SK_REGISTRO),
                lit(ctx.period().to_string()).alias(YYYYMM),
            ]);

        collect(table, lf)
    }
}
