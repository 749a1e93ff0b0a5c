//! Storage node contract
//!
//! Every node slot is reached through a [`ShardNode`]: one connection per
//! slot exposing put/get/get_meta/delete/size and a streaming key scan.
//! Transports (gRPC, HTTP, in-process) implement this trait; the DagNode
//! never touches node storage directly.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use stripestore_core::error::{Result, StripeError};
use stripestore_storage::NodeStore;

/// Asynchronous per-slot node client
///
/// Missing keys are reported as [`StripeError::SlotKeyNotFound`].
#[async_trait]
pub trait ShardNode: Send + Sync {
    /// Store a shard and its metadata under `key`
    async fn put(&self, key: &str, meta: Bytes, data: Bytes) -> Result<()>;

    /// Fetch a shard payload
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Fetch a shard's metadata record
    async fn get_meta(&self, key: &str) -> Result<Bytes>;

    /// Delete a shard and its metadata
    async fn delete(&self, key: &str) -> Result<()>;

    /// Payload size of a stored shard
    async fn size(&self, key: &str) -> Result<u64>;

    /// Stream every key held by the node
    ///
    /// The stream is finite; restarting means calling this again.
    fn all_keys(&self) -> BoxStream<'static, Result<String>>;
}

/// Adapts a local [`NodeStore`] to the [`ShardNode`] contract
pub struct LocalNode<S: NodeStore>(pub Arc<S>);

impl<S: NodeStore> LocalNode<S> {
    pub fn new(store: S) -> Self {
        Self(Arc::new(store))
    }

    pub fn store(&self) -> &Arc<S> {
        &self.0
    }
}

impl<S: NodeStore> Clone for LocalNode<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

fn not_found(key: &str) -> StripeError {
    StripeError::SlotKeyNotFound(key.to_string())
}

#[async_trait]
impl<S: NodeStore + 'static> ShardNode for LocalNode<S> {
    async fn put(&self, key: &str, meta: Bytes, data: Bytes) -> Result<()> {
        self.0.put(key, meta, data)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.0.get(key)?.ok_or_else(|| not_found(key))
    }

    async fn get_meta(&self, key: &str) -> Result<Bytes> {
        self.0.get_meta(key)?.ok_or_else(|| not_found(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.0.delete(key)? {
            Ok(())
        } else {
            Err(not_found(key))
        }
    }

    async fn size(&self, key: &str) -> Result<u64> {
        self.0.size(key)?.ok_or_else(|| not_found(key))
    }

    fn all_keys(&self) -> BoxStream<'static, Result<String>> {
        match self.0.all_keys() {
            Ok(keys) => stream::iter(keys).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }
}
