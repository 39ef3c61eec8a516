//! CNES Core: tables, dependency resolution, storage tiers and partitions.
//!
//! This crate holds everything a build needs except the runners:
//! - Periods and the canonical tier layout
//! - The `StorageTier` seam with local-directory and in-memory backends
//! - Table definitions (incremental or full-load) and the registry
//! - Dependency ordering with cycle detection
//! - Build contexts handed to table builders
//! - The built-in CNES tables

pub mod cache;
pub mod context;
pub mod error;
pub mod frame;
pub mod partition;
pub mod paths;
pub mod period;
pub mod registry;
pub mod resolver;
pub mod storage;
pub mod table;
pub mod tables;

pub use cache::BuildCache;
pub use context::{
    FullLoadContext, FullLoadStats, IncrementalContext, PartitionStream, RawInputs,
    SkippedPartition,
};
pub use error::BuildError;
pub use partition::{list_partitions, Partition};
pub use paths::Tier;
pub use period::{Period, PeriodError};
pub use registry::TableRegistry;
pub use resolver::DependencyResolver;
pub use storage::{LocalStorage, MemoryStorage, StorageError, StorageTier};
pub use table::{FullLoadBuilder, IncrementalBuilder, TableDefinition, TableKind, TableTier};
