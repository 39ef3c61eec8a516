//! In-memory storage, used by tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{validate_path, StorageError, StorageTier};
use crate::paths::Tier;

type Objects = BTreeMap<(Tier, String), Vec<u8>>;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<Objects>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects stored in `tier`.
    pub fn object_count(&self, tier: Tier) -> usize {
        self.read().keys().filter(|(t, _)| *t == tier).count()
    }

    /// Remove an object, returning whether it existed.
    pub fn remove(&self, tier: Tier, path: &str) -> bool {
        self.write().remove(&(tier, path.to_string())).is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, Objects> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Objects> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl StorageTier for MemoryStorage {
    fn get(&self, tier: Tier, path: &str) -> Result<Vec<u8>, StorageError> {
        self.read()
            .get(&(tier, path.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                tier,
                path: path.to_string(),
            })
    }

    fn put(
        &self,
        tier: Tier,
        path: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<(), StorageError> {
        validate_path(path)?;
        let mut objects = self.write();
        let key = (tier, path.to_string());
        if !overwrite && objects.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                tier,
                path: path.to_string(),
            });
        }
        objects.insert(key, bytes.to_vec());
        Ok(())
    }

    fn list(&self, tier: Tier, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .read()
            .keys()
            .filter(|(t, p)| *t == tier && p.starts_with(prefix))
            .map(|(_, p)| p.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_list() {
        let storage = MemoryStorage::new();
        storage.put(Tier::Curated, "b/period=202402/data", b"2", true).unwrap();
        storage.put(Tier::Curated, "b/period=202401/data", b"1", true).unwrap();
        storage.put(Tier::Aggregated, "b/data", b"x", true).unwrap();

        assert_eq!(storage.get(Tier::Curated, "b/period=202401/data").unwrap(), b"1");
        assert_eq!(
            storage.list(Tier::Curated, "b/").unwrap(),
            vec!["b/period=202401/data", "b/period=202402/data"]
        );
        assert_eq!(storage.object_count(Tier::Aggregated), 1);
    }

    #[test]
    fn missing_object_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage.get(Tier::Raw, "202401/tbMunicipio202401").unwrap_err();
        assert!(err.is_not_found());
        assert!(!storage.exists(Tier::Raw, "202401/tbMunicipio202401").unwrap());
    }

    #[test]
    fn overwrite_flag_is_honoured() {
        let storage = MemoryStorage::new();
        storage.put(Tier::Aggregated, "t/data", b"old", false).unwrap();
        let err = storage.put(Tier::Aggregated, "t/data", b"new", false).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        storage.put(Tier::Aggregated, "t/data", b"new", true).unwrap();
        assert_eq!(storage.get(Tier::Aggregated, "t/data").unwrap(), b"new");
    }

    #[test]
    fn tiers_are_isolated() {
        let storage = MemoryStorage::new();
        storage.put(Tier::Raw, "x/data", b"raw", true).unwrap();
        assert!(storage.get(Tier::Curated, "x/data").is_err());
        assert!(storage.list(Tier::Curated, "").unwrap().is_empty());
    }
}
