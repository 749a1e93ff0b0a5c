//! Sled-based node store
//!
//! Shard payloads and metadata records live in two trees keyed by the same
//! block key. Sled is pure Rust and crash-safe.

use crate::backend::{NodeStore, StorageStats};
use crate::StorageConfig;
use crate::backend::KeyIter;
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use stripestore_core::error::{Result, StripeError};
use tracing::{debug, info};

const SHARDS_TREE: &str = "shards";
const META_TREE: &str = "meta";

fn storage_err(e: sled::Error) -> StripeError {
    StripeError::Storage(e.to_string())
}

fn stored_len(value: Option<sled::IVec>) -> u64 {
    value.map_or(0, |v| v.len() as u64)
}

/// Sled-based node store
pub struct SledNodeStore {
    db: sled::Db,
    shards: sled::Tree,
    meta: sled::Tree,
    max_capacity: u64,
    /// Shard and metadata bytes currently stored
    bytes_used: AtomicU64,
    /// Serializes the capacity check with the inserts it guards
    write_lock: Mutex<()>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl SledNodeStore {
    /// Open or create a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(StorageConfig::new(path.as_ref()))
    }

    pub fn open_with_config(config: StorageConfig) -> Result<Self> {
        info!(path = ?config.path, "Opening Sled node store");

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_size)
            .open()
            .map_err(|e| StripeError::Storage(format!("Failed to open Sled: {}", e)))?;

        Self::from_db(db, config.max_capacity)
    }

    /// Open an in-memory store (for testing)
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StripeError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db, 0)
    }

    fn from_db(db: sled::Db, max_capacity: u64) -> Result<Self> {
        let shards = db.open_tree(SHARDS_TREE).map_err(storage_err)?;
        let meta = db.open_tree(META_TREE).map_err(storage_err)?;

        let mut used = 0u64;
        for tree in [&shards, &meta] {
            for item in tree.iter().values() {
                used += item.map_err(storage_err)?.len() as u64;
            }
        }
        debug!(bytes_used = used, keys = meta.len(), "Loaded Sled node store");

        Ok(Self {
            db,
            shards,
            meta,
            max_capacity,
            bytes_used: AtomicU64::new(used),
            write_lock: Mutex::new(()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    fn footprint(&self, key: &str) -> Result<u64> {
        let shard = self.shards.get(key.as_bytes()).map_err(storage_err)?;
        let meta = self.meta.get(key.as_bytes()).map_err(storage_err)?;
        Ok(stored_len(shard) + stored_len(meta))
    }
}

impl NodeStore for SledNodeStore {
    fn put(&self, key: &str, meta: Bytes, data: Bytes) -> Result<()> {
        let footprint = (meta.len() + data.len()) as u64;
        let _guard = self.write_lock.lock();

        if self.max_capacity > 0 {
            let replaced = self.footprint(key)?;
            let used = self.bytes_used.load(Ordering::SeqCst).saturating_sub(replaced);
            if used + footprint > self.max_capacity {
                return Err(StripeError::StorageFull {
                    used,
                    capacity: self.max_capacity,
                });
            }
        }

        // Payload first: a present meta record implies a present shard
        let old_shard = self.shards.insert(key.as_bytes(), data.as_ref()).map_err(storage_err)?;
        let old_meta = self.meta.insert(key.as_bytes(), meta.as_ref()).map_err(storage_err)?;
        let replaced = stored_len(old_shard) + stored_len(old_meta);
        self.bytes_used.fetch_sub(replaced, Ordering::SeqCst);
        self.bytes_used.fetch_add(footprint, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        debug!(key = %key, size = data.len(), "Stored shard");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let value = self.shards.get(key.as_bytes()).map_err(storage_err)?;
        Ok(value.map(|v| Bytes::copy_from_slice(&v)))
    }

    fn get_meta(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let value = self.meta.get(key.as_bytes()).map_err(storage_err)?;
        Ok(value.map(|v| Bytes::copy_from_slice(&v)))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let meta = self.meta.remove(key.as_bytes()).map_err(storage_err)?;
        let shard = self.shards.remove(key.as_bytes()).map_err(storage_err)?;
        let removed = meta.is_some() || shard.is_some();
        if removed {
            let freed = stored_len(meta) + stored_len(shard);
            self.bytes_used.fetch_sub(freed, Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        let value = self.shards.get(key.as_bytes()).map_err(storage_err)?;
        Ok(value.map(|v| v.len() as u64))
    }

    fn all_keys(&self) -> Result<KeyIter> {
        let keys = self.meta.iter().keys().map(|item| {
            let key = item.map_err(storage_err)?;
            String::from_utf8(key.to_vec())
                .map_err(|e| StripeError::Storage(format!("non-UTF-8 key: {}", e)))
        });
        Ok(Box::new(keys))
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            key_count: self.meta.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    /// Flush to disk
    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete() {
        let store = SledNodeStore::open_temporary().unwrap();
        let meta = Bytes::from_static(&[11, 0, 0, 0]);

        store
            .put("key", meta.clone(), Bytes::from_static(b"hello "))
            .unwrap();
        assert_eq!(store.get_meta("key").unwrap().unwrap(), meta);
        assert_eq!(
            store.get("key").unwrap().unwrap(),
            Bytes::from_static(b"hello ")
        );
        assert_eq!(store.size("key").unwrap(), Some(6));

        assert!(store.delete("key").unwrap());
        assert!(store.get("key").unwrap().is_none());
        assert!(!store.delete("key").unwrap());
    }

    #[test]
    fn test_all_keys() {
        let store = SledNodeStore::open_temporary().unwrap();
        for i in 0..5 {
            store
                .put(&format!("key_{}", i), Bytes::new(), Bytes::from(vec![i as u8; 3]))
                .unwrap();
        }
        let keys: Vec<String> = store.all_keys().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys.len(), 5);
        assert!(keys.contains(&"key_3".to_string()));
        assert_eq!(store.stats().unwrap().key_count, 5);
    }

    #[test]
    fn test_capacity_limit() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledNodeStore::open_with_config(
            StorageConfig::new(temp_dir.path()).with_max_capacity(10),
        )
        .unwrap();

        store
            .put("a", Bytes::from_static(&[1, 0, 0, 0]), Bytes::from_static(b"abc"))
            .unwrap();
        let result = store.put("b", Bytes::from_static(&[1, 0, 0, 0]), Bytes::from_static(b"abc"));
        assert!(matches!(result, Err(StripeError::StorageFull { .. })));
    }

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            SledNodeStore::open_with_config(
                StorageConfig::new(temp_dir.path()).with_max_capacity(40),
            )
            .unwrap(),
        );

        for round in 0..5 {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        let key = format!("r{}_k{}", round, i);
                        let _ = store.put(&key, Bytes::new(), Bytes::from(vec![0u8; 10]));
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let stats = store.stats().unwrap();
            assert!(stats.bytes_used <= 40, "round {}: {}", round, stats.bytes_used);
            assert_eq!(stats.key_count, 4);

            let keys: Vec<String> = store.all_keys().unwrap().collect::<Result<_>>().unwrap();
            for key in keys {
                assert!(store.delete(&key).unwrap());
            }
            assert_eq!(store.stats().unwrap().bytes_used, 0);
        }
    }

    #[test]
    fn test_usage_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = SledNodeStore::open(temp_dir.path()).unwrap();
            store
                .put("a", Bytes::from_static(&[3, 0, 0, 0]), Bytes::from_static(b"abc"))
                .unwrap();
            store
                .put("b", Bytes::from_static(&[1, 0, 0, 0]), Bytes::from_static(b"x"))
                .unwrap();
            // Replacing counts only the new value
            store
                .put("b", Bytes::from_static(&[2, 0, 0, 0]), Bytes::from_static(b"xy"))
                .unwrap();
            assert_eq!(store.stats().unwrap().bytes_used, 13);
            store.flush().unwrap();
        }
        let store = SledNodeStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.stats().unwrap().bytes_used, 13);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = SledNodeStore::open(temp_dir.path()).unwrap();
            store
                .put("key", Bytes::from_static(&[2, 0, 0, 0]), Bytes::from_static(b"hi"))
                .unwrap();
            store.flush().unwrap();
        }
        let store = SledNodeStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get("key").unwrap().unwrap(), Bytes::from_static(b"hi"));
    }
}
