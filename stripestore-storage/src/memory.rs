//! In-memory node store
//!
//! Used for testing and in-process clusters. Not persistent.

use crate::backend::{KeyIter, NodeStore, StorageStats};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use stripestore_core::error::{Result, StripeError};

#[derive(Clone)]
struct Entry {
    meta: Bytes,
    data: Bytes,
}

impl Entry {
    fn footprint(&self) -> u64 {
        (self.meta.len() + self.data.len()) as u64
    }
}

/// In-memory node store
pub struct MemoryNodeStore {
    /// Shard storage
    entries: RwLock<HashMap<String, Entry>>,

    /// Maximum capacity (0 = unlimited)
    max_capacity: u64,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryNodeStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with a maximum capacity
    pub fn with_capacity(max_bytes: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_capacity: max_bytes,
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Clear all stored shards
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }

    /// Overwrite a stored shard payload, keeping its metadata
    ///
    /// Simulates on-disk corruption; returns false if the key is absent.
    pub fn corrupt(&self, key: &str, data: Bytes) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) => {
                let old = entry.data.len() as u64;
                self.bytes_used.fetch_sub(old, Ordering::SeqCst);
                self.bytes_used.fetch_add(data.len() as u64, Ordering::SeqCst);
                entry.data = data;
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for MemoryNodeStore {
    fn put(&self, key: &str, meta: Bytes, data: Bytes) -> Result<()> {
        let entry = Entry { meta, data };
        let footprint = entry.footprint();

        let mut entries = self.entries.write();
        let replaced = entries.get(key).map(Entry::footprint).unwrap_or(0);

        // Check capacity
        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst) - replaced;
            if current + footprint > self.max_capacity {
                return Err(StripeError::StorageFull {
                    used: current,
                    capacity: self.max_capacity,
                });
            }
        }

        entries.insert(key.to_string(), entry);
        self.bytes_used.fetch_sub(replaced, Ordering::SeqCst);
        self.bytes_used.fetch_add(footprint, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.read();
        Ok(entries.get(key).map(|e| e.data.clone()))
    }

    fn get_meta(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.read();
        Ok(entries.get(key).map(|e| e.meta.clone()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write();

        if let Some(old) = entries.remove(key) {
            self.bytes_used.fetch_sub(old.footprint(), Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        let entries = self.entries.read();
        Ok(entries.get(key).map(|e| e.data.len() as u64))
    }

    fn all_keys(&self) -> Result<KeyIter> {
        let entries = self.entries.read();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn stats(&self) -> Result<StorageStats> {
        let entries = self.entries.read();
        Ok(StorageStats {
            key_count: entries.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }
}
