//! Local filesystem storage: one directory per tier under a root.
//!
//! Layout: `{root}/{tier}/{path}`.
//!
//! Writes are atomic: bytes go to a `.tmp` sibling first and are renamed into
//! place, so a reader never observes a half-written object.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{validate_path, StorageError, StorageTier};
use crate::paths::Tier;

const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.root.join(tier.as_str())
    }

    fn object_path(&self, tier: Tier, path: &str) -> PathBuf {
        let mut full = self.tier_dir(tier);
        for segment in path.split('/') {
            full.push(segment);
        }
        full
    }
}

fn io_err(tier: Tier, path: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        tier,
        path: path.to_string(),
        source,
    }
}

impl StorageTier for LocalStorage {
    fn get(&self, tier: Tier, path: &str) -> Result<Vec<u8>, StorageError> {
        validate_path(path)?;
        let full = self.object_path(tier, path);
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                tier,
                path: path.to_string(),
            }),
            Err(e) => Err(io_err(tier, path, e)),
        }
    }

    fn put(
        &self,
        tier: Tier,
        path: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<(), StorageError> {
        validate_path(path)?;
        let full = self.object_path(tier, path);
        if !overwrite && full.exists() {
            return Err(StorageError::AlreadyExists {
                tier,
                path: path.to_string(),
            });
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(tier, path, e))?;
        }

        let mut tmp_name = full.clone().into_os_string();
        tmp_name.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, bytes).map_err(|e| io_err(tier, path, e))?;
        fs::rename(&tmp, &full).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_err(tier, path, e)
        })?;
        Ok(())
    }

    fn list(&self, tier: Tier, prefix: &str) -> Result<Vec<String>, StorageError> {
        let base = self.tier_dir(tier);
        let mut out = Vec::new();
        if base.is_dir() {
            walk(&base, &base, &mut out).map_err(|e| io_err(tier, prefix, e))?;
        }
        out.retain(|p| p.starts_with(prefix) && !p.ends_with(TMP_SUFFIX));
        out.sort();
        Ok(out)
    }
}

/// Collect every file under `dir` as a `/`-separated path relative to `base`.
fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            let segments: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(segments.join("/"));
        }
    }
    Ok(())
}
