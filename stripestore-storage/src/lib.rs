//! stripestore Storage Backend
//!
//! The per-node side of a stripe: every node slot persists one shard per
//! block plus a fixed-size metadata record, keyed by the block key.
//! - `NodeStore` trait for pluggable node storage
//! - `MemoryNodeStore` for testing and single-process clusters
//! - `SledNodeStore` for persistent nodes

pub mod backend;
pub mod memory;
pub mod sled_backend;

pub use backend::{KeyIter, NodeStore, StorageStats};
pub use memory::MemoryNodeStore;
pub use sled_backend::SledNodeStore;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to storage directory
    pub path: std::path::PathBuf,

    /// Maximum storage capacity in bytes (0 = unlimited)
    pub max_capacity: u64,

    /// Sled page cache size in bytes
    pub cache_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from("./stripestore_data"),
            max_capacity: 0, // Unlimited
            cache_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl StorageConfig {
    /// Create a new storage config with the given path
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set maximum capacity
    pub fn with_max_capacity(mut self, bytes: u64) -> Self {
        self.max_capacity = bytes;
        self
    }

    /// Set cache size
    pub fn with_cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = bytes;
        self
    }
}
