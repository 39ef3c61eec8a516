use polars::prelude::*;

use super::{sources, sp_establishments, SK_REGISTRO, YYYYMM};
use crate::context::IncrementalContext;
use crate::error::BuildError;
use crate::frame::{collect, require_columns, surrogate_key};
use crate::table::IncrementalBuilder;

const OUTPUT_COLUMNS: [&str; 6] = [
    "CO_UNIDADE",
    "NO_MUNICIPIO",
    "CO_MUNICIPIO",
    "CO_SERVICO",
    "CO_CLASSIFICACAO",
    "DS_CLASSIFICACAO_SERVICO",
];

/// Specialised services and their classification, per São Paulo establishment.
///
/// One row per (`CO_UNIDADE`, `CO_SERVICO`, `CO_CLASSIFICACAO`).
pub struct Servicos;

impl IncrementalBuilder for Servicos {
    fn sources(&self) -> &[&'static str] {
        &[
            sources::ESTABELECIMENTO,
            sources::MUNICIPIO,
            sources::SERVICO_CLASSIFICACAO,
            sources::CLASSIFICACAO_SERVICO,
        ]
    }

    fn key_column(&self) -> &str {
        SK_REGISTRO
    }

    fn build(&self, ctx: &IncrementalContext<'_>) -> Result<DataFrame, BuildError> {
        let table = ctx.table();
        let estab = ctx.raw(sources::ESTABELECIMENTO)?;
        let mun = ctx.raw(sources::MUNICIPIO)?;
        let serv_class = ctx.raw(sources::SERVICO_CLASSIFICACAO)?;
        let class = ctx.raw(sources::CLASSIFICACAO_SERVICO)?;

        require_columns(
            table,
            estab,
            &["CO_UNIDADE", "CO_ESTADO_GESTOR", "CO_MUNICIPIO_GESTOR"],
        )?;
        require_columns(table, mun, &["CO_MUNICIPIO", "NO_MUNICIPIO"])?;
        require_columns(
            table,
            serv_class,
            &["CO_UNIDADE", "CO_SERVICO", "CO_CLASSIFICACAO"],
        )?;
        require_columns(
            table,
            class,
            &[
                "CO_SERVICO_ESPECIALIZADO",
                "CO_CLASSIFICACAO_SERVICO",
                "DS_CLASSIFICACAO_SERVICO",
            ],
        )?;

        let services = serv_class.clone().lazy().join(
            class.clone().lazy(),
            [col("CO_SERVICO"), col("CO_CLASSIFICACAO")],
            [col("CO_SERVICO_ESPECIALIZADO"), col("CO_CLASSIFICACAO_SERVICO")],
            JoinArgs::new(JoinType::Inner),
        );

        let joined = services.join(
            sp_establishments(estab, mun),
            [col("CO_UNIDADE")],
            [col("CO_UNIDADE")],
            JoinArgs::new(JoinType::Inner),
        );

        let lf = joined
            .select(OUTPUT_COLUMNS.map(col))
            .with_columns([
                surrogate_key(&["CO_UNIDADE", "CO_SERVICO", "CO_CLASSIFICACAO"]).alias(SK_REGISTRO),
                lit(ctx.period().to_string()).alias(YYYYMM),
            ]);

        collect(table, lf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BuildCache;
    use crate::context::RawInputs;
    use crate::period::Period;

    fn inputs() -> RawInputs {
        let mut raw = RawInputs::new();
        raw.insert(
            sources::ESTABELECIMENTO,
            df!(
                "CO_UNIDADE" => &["3550301", "3304551"],
                "CO_ESTADO_GESTOR" => &["35", "33"],
                "CO_MUNICIPIO_GESTOR" => &["355030", "330455"]
            )
            .unwrap(),
        );
        raw.insert(
            sources::MUNICIPIO,
            df!(
                "CO_MUNICIPIO" => &["355030", "330455"],
                "NO_MUNICIPIO" => &["SAO PAULO", "RIO DE JANEIRO"]
            )
            .unwrap(),
        );
        raw.insert(
            sources::SERVICO_CLASSIFICACAO,
            df!(
                "CO_UNIDADE" => &["3550301", "3550301", "3304551"],
                "CO_SERVICO" => &["100", "101", "100"],
                "CO_CLASSIFICACAO" => &["001", "002", "001"]
            )
            .unwrap(),
        );
        raw.insert(
            sources::CLASSIFICACAO_SERVICO,
            df!(
                "CO_SERVICO_ESPECIALIZADO" => &["100", "101"],
                "CO_CLASSIFICACAO_SERVICO" => &["001", "002"],
                "DS_CLASSIFICACAO_SERVICO" => &["HEMODIALISE", "QUIMIOTERAPIA"]
            )
            .unwrap(),
        );
        raw
    }

    #[test]
    fn builds_sp_services_with_surrogate_key() {
        let raw = inputs();
        let cache = BuildCache::new();
        let period: Period = "202401".parse().unwrap();
        let ctx = IncrementalContext::new("servicos", &[], period, &raw, &cache);

        let out = Servicos.build(&ctx).unwrap();
        assert_eq!(out.height(), 2);

        let mut keys: Vec<String> = out
            .column(SK_REGISTRO)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["3550301_100_001", "3550301_101_002"]);

        let yyyymm = out.column(YYYYMM).unwrap().str().unwrap().get(0);
        assert_eq!(yyyymm, Some("202401"));
        assert!(out.column("DS_CLASSIFICACAO_SERVICO").is_ok());
    }

    #[test]
    fn missing_extract_is_reported() {
        let full = inputs();
        let raw: RawInputs = full
            .names()
            .into_iter()
            .filter(|n| *n != sources::CLASSIFICACAO_SERVICO)
            .map(|n| (n.to_string(), full.get(n).unwrap().clone()))
            .collect();
        let cache = BuildCache::new();
        let ctx = IncrementalContext::new("servicos", &[], "202401".parse().unwrap(), &raw, &cache);
        assert!(matches!(
            Servicos.build(&ctx),
            Err(BuildError::MissingInput { ref input, .. }) if input == sources::CLASSIFICACAO_SERVICO
        ));
    }

    #[test]
    fn missing_column_is_schema_violation() {
        let mut raw = inputs();
        raw.insert(
            sources::MUNICIPIO,
            df!("CO_MUNICIPIO" => &["355030"]).unwrap(),
        );
        let cache = BuildCache::new();
        let ctx = IncrementalContext::new("servicos", &[], "202401".parse().unwrap(), &raw, &cache);
        assert!(matches!(
            Servicos.build(&ctx),
            Err(BuildError::SchemaViolation { .. })
        ));
    }
}
