//! Data frame helpers shared by table builders and runners.
//!
//! - Parquet encode/decode for tier objects
//! - Surrogate key construction and deduplication
//! - Column presence checks

use polars::prelude::*;
use std::io::Cursor;
use thiserror::Error;

use crate::error::BuildError;

/// Separator between natural-key values in a surrogate key.
pub const KEY_SEPARATOR: &str = "_";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("object is empty (zero bytes)")]
    Empty,

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Encode a frame as Parquet bytes.
pub fn encode_parquet(df: &DataFrame) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut df.clone())?;
    Ok(buf)
}

/// Decode Parquet bytes. Zero-length input is rejected up front.
pub fn decode_parquet(bytes: &[u8]) -> Result<DataFrame, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }
    Ok(ParquetReader::new(Cursor::new(bytes)).finish()?)
}

/// Collect a lazy plan, attributing any failure to `table`.
pub fn collect(table: &str, lf: LazyFrame) -> Result<DataFrame, BuildError> {
    lf.collect().map_err(|e| BuildError::frame(table, e))
}

/// Fail with `SchemaViolation` unless every column in `required` is present.
pub fn require_columns(table: &str, df: &DataFrame, required: &[&str]) -> Result<(), BuildError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| df.get_column_index(c).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BuildError::SchemaViolation {
            table: table.to_string(),
            reason: format!("missing column(s): {}", missing.join(", ")),
        })
    }
}

/// Surrogate key expression: the given columns as strings joined with `_`.
///
/// A null in any component yields a null key.
pub fn surrogate_key(columns: &[&str]) -> Expr {
    let parts: Vec<Expr> = columns
        .iter()
        .map(|c| col(*c).cast(DataType::String))
        .collect();
    concat_str(parts, KEY_SEPARATOR, false)
}

/// Number of rows whose `key` value repeats an earlier row.
pub fn duplicate_key_count(df: &DataFrame, key: &str) -> PolarsResult<usize> {
    let distinct = df.column(key)?.as_materialized_series().n_unique()?;
    Ok(df.height() - distinct)
}

/// Keep exactly one row per `key` value.
///
/// Rows are first ordered by the key and then by every other column, so the
/// surviving row and the output order do not depend on the input order.
/// Returns the deduplicated frame and the number of rows dropped.
pub fn dedup_by_key(df: DataFrame, key: &str) -> PolarsResult<(DataFrame, usize)> {
    let before = df.height();
    let mut order: Vec<PlSmallStr> = vec![key.into()];
    order.extend(
        df.get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != key)
            .cloned(),
    );

    let out = df
        .lazy()
        .sort(order, SortMultipleOptions::default().with_maintain_order(true))
        .unique_stable(Some(vec![key.into()]), UniqueKeepStrategy::First)
        .collect()?;

    let dropped = before - out.height();
    Ok((out, dropped))
}

/// An empty frame with the given column names and types.
pub fn empty_frame(fields: &[(&str, DataType)]) -> DataFrame {
    let schema = Schema::from_iter(
        fields
            .iter()
            .map(|(name, dtype)| Field::new((*name).into(), dtype.clone())),
    );
    DataFrame::empty_with_schema(&schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parquet_round_trip_preserves_rows() {
        let df = df!(
            "SK_REGISTRO" => &["1_2_3", "4_5_6"],
            "YYYYMM" => &["202401", "202401"]
        )
        .unwrap();
        let bytes = encode_parquet(&df).unwrap();
        let back = decode_parquet(&bytes).unwrap();
        assert!(back.equals(&df));
    }

    #[test]
    fn zero_length_and_garbage_fail_to_decode() {
        assert!(matches!(decode_parquet(&[]), Err(FrameError::Empty)));
        assert!(decode_parquet(b"definitely not parquet").is_err());
    }

    #[test]
    fn colliding_keys_keep_exactly_one_row() {
        let df = df!(
            "k" => &["a", "b", "a"],
            "v" => &["2", "1", "1"]
        )
        .unwrap();
        let (out, dropped) = dedup_by_key(df, "k").unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(out.height(), 2);
        assert_eq!(duplicate_key_count(&out, "k").unwrap(), 0);

        // Deterministic survivor: smallest remaining columns win.
        let v = out.column("v").unwrap().str().unwrap().get(0);
        assert_eq!(v, Some("1"));
    }

    #[test]
    fn dedup_is_independent_of_input_order() {
        let a = df!("k" => &["x", "y", "x"], "v" => &["1", "2", "3"]).unwrap();
        let b = df!("k" => &["x", "x", "y"], "v" => &["3", "1", "2"]).unwrap();
        let (a, _) = dedup_by_key(a, "k").unwrap();
        let (b, _) = dedup_by_key(b, "k").unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn surrogate_key_joins_columns() {
        let df = df!("a" => &["1", "2"], "b" => &[10i64, 20]).unwrap();
        let out = df
            .lazy()
            .with_column(surrogate_key(&["a", "b"]).alias("sk"))
            .collect()
            .unwrap();
        let sk: Vec<Option<&str>> = out.column("sk").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(sk, vec![Some("1_10"), Some("2_20")]);
    }

    #[test]
    fn require_columns_reports_every_missing_name() {
        let df = df!("a" => &["1"]).unwrap();
        let err = require_columns("t", &df, &["a", "b", "c"]).unwrap_err();
        match err {
            BuildError::SchemaViolation { reason, .. } => assert!(reason.contains("b, c")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_frame_has_schema() {
        let df = empty_frame(&[("x", DataType::Int64), ("y", DataType::String)]);
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 2);
        assert_eq!(df.column("x").unwrap().dtype(), &DataType::Int64);
    }
}
