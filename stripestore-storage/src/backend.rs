//! Node store trait
//!
//! Defines the key/value contract every storage node implements: a shard
//! payload and its small metadata record, both addressed by the block key.

use bytes::Bytes;
use stripestore_core::error::Result;

/// Owned, lazily evaluated scan over stored keys
pub type KeyIter = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Total number of keys stored
    pub key_count: u64,

    /// Total bytes used by shard payloads and metadata
    pub bytes_used: u64,

    /// Total storage capacity (0 = unlimited)
    pub bytes_capacity: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of write operations
    pub writes: u64,

    /// Number of delete operations
    pub deletes: u64,
}

impl StorageStats {
    /// Calculate usage percentage
    pub fn usage_percent(&self) -> f64 {
        if self.bytes_capacity == 0 {
            0.0
        } else {
            (self.bytes_used as f64 / self.bytes_capacity as f64) * 100.0
        }
    }
}

/// Synchronous per-node shard store
///
/// Lookups return `Ok(None)` for absent keys; callers decide whether that
/// is an error.
pub trait NodeStore: Send + Sync {
    /// Store a shard and its metadata under `key`, replacing any previous value
    fn put(&self, key: &str, meta: Bytes, data: Bytes) -> Result<()>;

    /// Retrieve a shard payload
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Retrieve a shard's metadata record
    fn get_meta(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete a shard and its metadata; returns whether anything was removed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Payload size of a stored shard
    fn size(&self, key: &str) -> Result<Option<u64>>;

    /// Scan every key currently stored
    fn all_keys(&self) -> Result<KeyIter>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;

    /// Flush any pending writes
    fn flush(&self) -> Result<()>;
}
