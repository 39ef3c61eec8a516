//! Partition discovery over the curated and aggregated tiers.

use serde::Serialize;

use crate::paths::{aggregated_object, parse_curated_object, table_prefix, Tier};
use crate::period::Period;
use crate::storage::{StorageError, StorageTier};

/// One discovered object of a table.
///
/// Curated partitions carry their period; the single aggregated object has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub period: Option<Period>,
    pub path: String,
}

/// Discover the objects of `table` in `tier`.
///
/// - curated: every `{table}/period={YYYYMM}/data`, ascending by period;
///   paths that do not parse are ignored
/// - aggregated: the `{table}/data` object if it exists
/// - raw: raw objects are not table-partitioned, so nothing is returned
pub fn list_partitions(
    storage: &dyn StorageTier,
    tier: Tier,
    table: &str,
) -> Result<Vec<Partition>, StorageError> {
    match tier {
        Tier::Raw => Ok(Vec::new()),
        Tier::Curated => {
            let mut parts: Vec<Partition> = storage
                .list(tier, &table_prefix(table))?
                .into_iter()
                .filter_map(|path| {
                    parse_curated_object(table, &path).map(|period| Partition {
                        period: Some(period),
                        path,
                    })
                })
                .collect();
            parts.sort_by_key(|p| p.period);
            parts.dedup_by_key(|p| p.period);
            Ok(parts)
        }
        Tier::Aggregated => {
            let path = aggregated_object(table);
            if storage.exists(tier, &path)? {
                Ok(vec![Partition { period: None, path }])
            } else {
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::curated_object;
    use crate::storage::MemoryStorage;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn curated_partitions_sorted_and_filtered() {
        let storage = MemoryStorage::new();
        for path in [
            curated_object("estab", p("202402")),
            curated_object("estab", p("202311")),
            curated_object("estab_metricas", p("202401")),
            "estab/period=2024/data".to_string(),
            "estab/notes.txt".to_string(),
            curated_object("estab", p("202401")),
        ] {
            storage.put(Tier::Curated, &path, b"x", true).unwrap();
        }

        let parts = list_partitions(&storage, Tier::Curated, "estab").unwrap();
        let periods: Vec<Option<Period>> = parts.iter().map(|part| part.period).collect();
        assert_eq!(periods, vec![Some(p("202311")), Some(p("202401")), Some(p("202402"))]);
        assert_eq!(parts[0].path, "estab/period=202311/data");
    }

    #[test]
    fn aggregated_table_has_at_most_one_object() {
        let storage = MemoryStorage::new();
        assert!(list_partitions(&storage, Tier::Aggregated, "m").unwrap().is_empty());

        storage.put(Tier::Aggregated, "m/data", b"x", true).unwrap();
        let parts = list_partitions(&storage, Tier::Aggregated, "m").unwrap();
        assert_eq!(
            parts,
            vec![Partition {
                period: None,
                path: "m/data".into()
            }]
        );
    }

    #[test]
    fn raw_tier_has_no_table_partitions() {
        let storage = MemoryStorage::new();
        storage.put(Tier::Raw, "202401/tbMunicipio202401", b"x", true).unwrap();
        assert!(list_partitions(&storage, Tier::Raw, "tbMunicipio").unwrap().is_empty());
    }
}
