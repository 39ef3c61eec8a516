//! The table registry: every known table definition, keyed by unique name.

use std::collections::BTreeMap;

use crate::error::BuildError;
use crate::table::{TableDefinition, TableTier};

/// Name → definition. Iteration is always in name order.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, TableDefinition>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Names are unique; a second registration fails with
    /// `DuplicateName` and leaves the first definition in place.
    pub fn register(&mut self, definition: TableDefinition) -> Result<(), BuildError> {
        let name = definition.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(BuildError::DuplicateName(name));
        }
        self.tables.insert(name, definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&TableDefinition, BuildError> {
        self.tables
            .get(name)
            .ok_or_else(|| BuildError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn curated_names(&self) -> Vec<String> {
        self.names_in(TableTier::Curated)
    }

    pub fn aggregated_names(&self) -> Vec<String> {
        self.names_in(TableTier::Aggregated)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    /// Check every declared dependency: it must be registered and live in the
    /// curated tier.
    pub fn validate(&self) -> Result<(), BuildError> {
        for def in self.tables.values() {
            for dep in def.dependencies() {
                match self.tables.get(dep) {
                    None => {
                        return Err(BuildError::UnknownDependency {
                            table: def.name().to_string(),
                            dependency: dep.clone(),
                        })
                    }
                    Some(target) if target.tier() != TableTier::Curated => {
                        return Err(BuildError::InvalidDependency {
                            table: def.name().to_string(),
                            dependency: dep.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn names_in(&self, tier: TableTier) -> Vec<String> {
        self.tables
            .values()
            .filter(|d| d.tier() == tier)
            .map(|d| d.name().to_string())
            .collect()
    }
}
