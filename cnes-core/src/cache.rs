//! Per-run build cache: table name → already-built frame.
//!
//! Created at the start of a run and dropped at its end, so a table can consume
//! an earlier table's output without re-reading storage.

use polars::prelude::DataFrame;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct BuildCache {
    frames: HashMap<String, DataFrame>,
}

impl BuildCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, df: DataFrame) {
        self.frames.insert(table.into(), df);
    }

    pub fn get(&self, table: &str) -> Option<&DataFrame> {
        self.frames.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.frames.contains_key(table)
    }

    /// Cached table names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.frames.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn insert_and_lookup() {
        let mut cache = BuildCache::new();
        assert!(cache.is_empty());
        cache.insert("servicos", df!("a" => &[1i64]).unwrap());
        cache.insert("estabelecimentos", DataFrame::empty());
        assert!(cache.contains("servicos"));
        assert_eq!(cache.get("servicos").unwrap().height(), 1);
        assert!(cache.get("missing").is_none());
        assert_eq!(cache.names(), vec!["estabelecimentos", "servicos"]);
    }
}
