//! Pipeline configuration loaded from TOML.
//!
//! ```toml
//! storage_root = "data"
//! months_back = 3
//!
//! [reference]
//! tier = "aggregated"
//! path = "populacao/data"
//!
//! # Optional: restrict the default targets.
//! curated_tables = ["estabelecimentos"]
//! aggregated_tables = ["estabelecimentos_metricas_sp"]
//! ```
//!
//! Every key is optional; missing keys take the defaults above.

use chrono::NaiveDate;
use cnes_core::tables::ReferenceSource;
use cnes_core::{Period, Tier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding one sub-directory per tier.
    pub storage_root: PathBuf,

    /// Default build period is this many months before today.
    pub months_back: u32,

    /// Population dataset joined by the metrics table.
    pub reference: ReferenceSource,

    /// Curated tables built by default (all when unset).
    pub curated_tables: Option<Vec<String>>,

    /// Aggregated tables built by default (all when unset).
    pub aggregated_tables: Option<Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data"),
            months_back: 3,
            reference: ReferenceSource::default(),
            curated_tables: None,
            aggregated_tables: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reference.path.trim().is_empty() {
            return Err(ConfigError::Invalid("reference.path must not be empty".into()));
        }
        if self.reference.tier == Tier::Raw {
            return Err(ConfigError::Invalid(
                "reference.tier must be curated or aggregated".into(),
            ));
        }
        for (key, list) in [
            ("curated_tables", &self.curated_tables),
            ("aggregated_tables", &self.aggregated_tables),
        ] {
            if matches!(list, Some(names) if names.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "{key} must name at least one table when set"
                )));
            }
        }
        Ok(())
    }

    /// Period built when none is given: `months_back` months before `today`.
    pub fn default_period(&self, today: NaiveDate) -> Period {
        Period::months_before(today, self.months_back)
    }
}
