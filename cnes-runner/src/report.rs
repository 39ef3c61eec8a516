//! Run reports.
//!
//! Every runner returns a serializable summary: rows per table, duplicates
//! collapsed, partitions read and skipped, reference misses, and a BLAKE3 hash
//! of each object written. Reports from one CLI invocation are gathered in a
//! `RunReport` and can be saved as JSON.

use chrono::{DateTime, Utc};
use cnes_core::{FullLoadStats, Period, SkippedPartition, TableTier, Tier};
use serde::Serialize;
use std::path::Path;

/// An object written to a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenObject {
    pub tier: Tier,
    pub path: String,
    pub bytes: usize,
    /// BLAKE3 of the object contents, hex encoded.
    pub content_hash: String,
}

impl WrittenObject {
    pub fn new(tier: Tier, path: impl Into<String>, data: &[u8]) -> Self {
        Self {
            tier,
            path: path.into(),
            bytes: data.len(),
            content_hash: blake3::hash(data).to_hex().to_string(),
        }
    }
}

/// What happened to one table in a run.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub tier: TableTier,
    pub rows: usize,
    pub duplicates_dropped: usize,
    pub partitions_read: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_partitions: Vec<SkippedPartition>,
    pub reference_misses: usize,
    /// `None` on a dry run.
    pub object: Option<WrittenObject>,
}

impl TableOutcome {
    pub fn curated(
        table: &str,
        rows: usize,
        duplicates_dropped: usize,
        object: Option<WrittenObject>,
    ) -> Self {
        Self {
            table: table.to_string(),
            tier: TableTier::Curated,
            rows,
            duplicates_dropped,
            partitions_read: 0,
            skipped_partitions: Vec::new(),
            reference_misses: 0,
            object,
        }
    }

    pub fn aggregated(
        table: &str,
        rows: usize,
        stats: FullLoadStats,
        object: Option<WrittenObject>,
    ) -> Self {
        Self {
            table: table.to_string(),
            tier: TableTier::Aggregated,
            rows,
            duplicates_dropped: 0,
            partitions_read: stats.partitions_read,
            skipped_partitions: stats.skipped,
            reference_misses: stats.reference_misses,
            object,
        }
    }
}

/// One incremental run: a single period.
#[derive(Debug, Clone, Serialize)]
pub struct IncrementalReport {
    pub period: Period,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableOutcome>,
}

impl IncrementalReport {
    pub fn table(&self, name: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn rows_written(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// One full-load run over every requested aggregated table.
#[derive(Debug, Clone, Serialize)]
pub struct FullLoadReport {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableOutcome>,
}

impl FullLoadReport {
    pub fn table(&self, name: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn skipped_partitions(&self) -> usize {
        self.tables.iter().map(|t| t.skipped_partitions.len()).sum()
    }
}

/// Everything one command did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub incremental: Vec<IncrementalReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_load: Option<FullLoadReport>,
}

impl RunReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_blake3_hex() {
        let obj = WrittenObject::new(Tier::Curated, "servicos/period=202401/data", b"abc");
        assert_eq!(obj.bytes, 3);
        assert_eq!(obj.content_hash.len(), 64);
        assert_eq!(obj.content_hash, blake3::hash(b"abc").to_hex().to_string());
    }

    #[test]
    fn report_serializes_periods_as_text() {
        let now = Utc::now();
        let report = RunReport {
            incremental: vec![IncrementalReport {
                period: "202401".parse().unwrap(),
                dry_run: true,
                started_at: now,
                finished_at: now,
                tables: vec![TableOutcome::curated("servicos", 10, 1, None)],
            }],
            full_load: None,
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["incremental"][0]["period"], "202401");
        assert_eq!(json["incremental"][0]["tables"][0]["duplicates_dropped"], 1);
        assert_eq!(json["incremental"][0]["tables"][0]["tier"], "curated");
        assert!(json.get("full_load").is_none());
    }

    #[test]
    fn rows_written_sums_every_table() {
        let now = Utc::now();
        let report = IncrementalReport {
            period: "202401".parse().unwrap(),
            dry_run: false,
            started_at: now,
            finished_at: now,
            tables: vec![
                TableOutcome::curated("estabelecimentos", 7, 0, None),
                TableOutcome::curated("servicos", 3, 2, None),
            ],
        };
        assert_eq!(report.rows_written(), 10);
        assert_eq!(report.table("servicos").unwrap().duplicates_dropped, 2);
        assert!(report.table("missing").is_none());
    }

    #[test]
    fn writes_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        RunReport::default().write_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("incremental"));
    }
}
