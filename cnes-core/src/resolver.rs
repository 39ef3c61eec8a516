//! Dependency ordering over the table registry.
//!
//! Depth-first search with three marks: unvisited, in progress, done. Reaching
//! a table that is still in progress means the graph has a cycle. Done tables
//! are never expanded again, so resolution is linear in tables plus edges.

use std::collections::HashMap;

use crate::error::BuildError;
use crate::registry::TableRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

pub struct DependencyResolver<'r> {
    registry: &'r TableRegistry,
}

impl<'r> DependencyResolver<'r> {
    pub fn new(registry: &'r TableRegistry) -> Self {
        Self { registry }
    }

    /// Every requested table, after all of its transitive dependencies, each
    /// exactly once.
    ///
    /// Requested names are expanded in the order given and dependencies in
    /// declaration order, so the same input always yields the same order.
    pub fn order<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>, BuildError> {
        let mut marks: HashMap<&'r str, Mark> = HashMap::new();
        let mut out = Vec::new();

        for name in requested {
            let def = self.registry.get(name.as_ref())?;
            self.visit(def.name(), &mut marks, &mut out)?;
        }
        Ok(out)
    }

    fn visit(
        &self,
        table: &'r str,
        marks: &mut HashMap<&'r str, Mark>,
        out: &mut Vec<String>,
    ) -> Result<(), BuildError> {
        match marks.get(table) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(BuildError::CycleDetected {
                    table: table.to_string(),
                })
            }
            None => {}
        }

        marks.insert(table, Mark::InProgress);
        let def = self.registry.get(table)?;
        for dep in def.dependencies() {
            let target = self
                .registry
                .get(dep)
                .map_err(|_| BuildError::UnknownDependency {
                    table: table.to_string(),
                    dependency: dep.clone(),
                })?;
            self.visit(target.name(), marks, out)?;
        }
        marks.insert(table, Mark::Done);
        out.push(table.to_string());
        Ok(())
    }
}
