//! Tiered object storage.
//!
//! The `StorageTier` trait abstracts over where tier objects live so the runners
//! can be handed a local directory in production and an in-memory fake in tests.
//! Implementations do not retry; transient failures surface to the caller.

pub mod local;
pub mod memory;

use thiserror::Error;

use crate::paths::Tier;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {tier}:{path}")]
    NotFound { tier: Tier, path: String },

    #[error("object already exists: {tier}:{path}")]
    AlreadyExists { tier: Tier, path: String },

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("storage I/O error on {tier}:{path}: {source}")]
    Io {
        tier: Tier,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Key/blob access to the three storage tiers.
///
/// Paths are `/`-separated and relative to the tier root.
pub trait StorageTier: Send + Sync {
    /// Read a whole object.
    fn get(&self, tier: Tier, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a whole object. With `overwrite = false` an existing object is an error.
    fn put(&self, tier: Tier, path: &str, bytes: &[u8], overwrite: bool)
        -> Result<(), StorageError>;

    /// All object paths in `tier` starting with `prefix`, sorted ascending.
    fn list(&self, tier: Tier, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Whether an object exists.
    fn exists(&self, tier: Tier, path: &str) -> Result<bool, StorageError> {
        match self.get(tier, path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Reject empty, absolute and parent-relative object paths.
pub(crate) fn validate_path(path: &str) -> Result<(), StorageError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
