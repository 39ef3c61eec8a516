//! Raw extract loading.
//!
//! Raw objects are the semicolon-separated CSV files of the monthly CNES
//! archive, stored as `{period}/{source}{period}`. Every column is read as
//! text. Files are UTF-8 when possible; anything else is decoded as Latin-1,
//! the archive's native encoding.

use cnes_core::paths::{raw_object, raw_prefix};
use cnes_core::{Period, RawInputs, StorageError, StorageTier, Tier};
use polars::prelude::*;
use std::borrow::Cow;
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("raw source '{name}' for {period}: {err}")]
    Storage {
        name: String,
        period: Period,
        #[source]
        err: StorageError,
    },

    #[error("raw source '{name}' for {period} is not valid CSV: {err}")]
    Parse {
        name: String,
        period: Period,
        #[source]
        err: PolarsError,
    },
}

/// Reads raw extracts of one period from the raw tier.
pub struct RawLoader<'s> {
    storage: &'s dyn StorageTier,
}

impl<'s> RawLoader<'s> {
    pub fn new(storage: &'s dyn StorageTier) -> Self {
        Self { storage }
    }

    /// Load one extract. `Ok(None)` when the object does not exist.
    pub fn load_source(&self, period: Period, name: &str) -> Result<Option<DataFrame>, LoadError> {
        let path = raw_object(period, name);
        let bytes = match self.storage.get(Tier::Raw, &path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(err) => {
                return Err(LoadError::Storage {
                    name: name.to_string(),
                    period,
                    err,
                })
            }
        };
        let df = parse_csv(&bytes).map_err(|err| LoadError::Parse {
            name: name.to_string(),
            period,
            err,
        })?;
        debug!(source = name, %period, rows = df.height(), "loaded raw extract");
        Ok(Some(df))
    }

    /// Load every named extract that exists for `period`.
    ///
    /// Absent extracts are skipped with a warning; the table that needs one
    /// fails with `MissingInput` when its turn comes.
    pub fn load(&self, period: Period, sources: &[&str]) -> Result<RawInputs, LoadError> {
        let mut raw = RawInputs::new();
        for name in sources {
            match self.load_source(period, name)? {
                Some(df) => raw.insert(*name, df),
                None => warn!(source = *name, %period, "raw extract not found"),
            }
        }
        info!(%period, loaded = raw.len(), requested = sources.len(), "raw inputs ready");
        Ok(raw)
    }

    /// Source names present in the raw tier for `period`, sorted.
    pub fn available_sources(&self, period: Period) -> Result<Vec<String>, StorageError> {
        let prefix = raw_prefix(period);
        let suffix = period.to_string();
        let names = self
            .storage
            .list(Tier::Raw, &prefix)?
            .into_iter()
            .filter_map(|path| {
                let file = path.strip_prefix(&prefix)?;
                let name = file.strip_suffix(&suffix)?;
                (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
            })
            .collect();
        Ok(names)
    }
}

/// Parse a raw CSV extract: `;` separated, `"` quoted, header row, all text.
pub fn parse_csv(bytes: &[u8]) -> PolarsResult<DataFrame> {
    let text = decode_text(bytes);
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| {
            opts.with_separator(b';')
                .with_quote_char(Some(b'"'))
                .with_truncate_ragged_lines(true)
        })
        .into_reader_with_file_handle(Cursor::new(text.into_owned()))
        .finish()
}

/// UTF-8 (BOM stripped) when valid, otherwise Latin-1.
fn decode_text(bytes: &[u8]) -> Cow<'_, [u8]> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if std::str::from_utf8(bytes).is_ok() {
        return Cow::Borrowed(bytes);
    }
    // Every Latin-1 byte maps to the code point of the same value.
    let text: String = bytes.iter().map(|&b| char::from(b)).collect();
    Cow::Owned(text.into_bytes())
}
