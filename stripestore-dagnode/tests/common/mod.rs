//! Shared fixtures for DagNode integration tests
//!
//! Every slot is an in-memory node store behind a [`FaultyNode`], which can
//! be told to go down, panic, stall or lie about block sizes.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use stripestore_core::{Result, ShardMeta, StripeError};
use stripestore_dagnode::{LocalNode, NodeSlot, ShardNode, StripedDagNode};
use stripestore_storage::MemoryNodeStore;

/// Failure mode of one test node
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Healthy,
    /// Every call fails with a transport error naming the node
    Down,
    /// Every call fails with the same transport error on every node
    Refused,
    /// Every call panics inside the slot task
    Panic,
    /// Every call sleeps before answering
    Slow(Duration),
    /// Metadata reads report this block size instead of the stored one
    DriftSize(i32),
    /// Every call is refused
    DenyAccess,
}

pub struct FaultyNode {
    name: String,
    inner: LocalNode<MemoryNodeStore>,
    fault: Mutex<Fault>,
}

impl FaultyNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: LocalNode::new(MemoryNodeStore::new()),
            fault: Mutex::new(Fault::Healthy),
        }
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock() = fault;
    }

    pub fn heal(&self) {
        self.set_fault(Fault::Healthy);
    }

    pub fn store(&self) -> &Arc<MemoryNodeStore> {
        self.inner.store()
    }

    async fn check(&self, op: &str) -> Result<()> {
        let fault = self.fault.lock().clone();
        match fault {
            Fault::Healthy | Fault::DriftSize(_) => Ok(()),
            Fault::Down => Err(StripeError::Transport(format!(
                "{}: connection refused",
                self.name
            ))),
            Fault::Refused => Err(StripeError::Transport("connection refused".to_string())),
            Fault::Panic => panic!("{}: injected panic during {}", self.name, op),
            Fault::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Fault::DenyAccess => Err(StripeError::AccessDenied(self.name.clone())),
        }
    }
}

#[async_trait]
impl ShardNode for FaultyNode {
    async fn put(&self, key: &str, meta: Bytes, data: Bytes) -> Result<()> {
        self.check("put").await?;
        self.inner.put(key, meta, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.check("get").await?;
        self.inner.get(key).await
    }

    async fn get_meta(&self, key: &str) -> Result<Bytes> {
        self.check("get_meta").await?;
        let meta = self.inner.get_meta(key).await?;
        let drift = match *self.fault.lock() {
            Fault::DriftSize(size) => Some(size),
            _ => None,
        };
        match drift {
            Some(block_size) => Ok(Bytes::from(ShardMeta { block_size }.encode()?)),
            None => Ok(meta),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check("delete").await?;
        self.inner.delete(key).await
    }

    async fn size(&self, key: &str) -> Result<u64> {
        self.check("size").await?;
        self.inner.size(key).await
    }

    fn all_keys(&self) -> BoxStream<'static, Result<String>> {
        if *self.fault.lock() == Fault::Down {
            let error = StripeError::Transport(format!("{}: connection refused", self.name));
            return stream::once(async move { Err(error) }).boxed();
        }
        self.inner.all_keys()
    }
}

/// A DagNode over k+m fault-injecting in-memory nodes
pub struct Cluster {
    pub nodes: Vec<Arc<FaultyNode>>,
    pub dagnode: StripedDagNode,
}

impl Cluster {
    pub fn new(data_shards: usize, parity_shards: usize) -> Self {
        let nodes: Vec<Arc<FaultyNode>> = (0..data_shards + parity_shards)
            .map(|i| Arc::new(FaultyNode::new(format!("node-{}", i))))
            .collect();
        let slots = nodes.iter().map(slot_for).collect();
        let dagnode = StripedDagNode::new(data_shards, parity_shards, slots)
            .expect("valid cluster geometry");
        Self { nodes, dagnode }
    }

    pub fn fail(&self, slots: &[usize], fault: Fault) {
        for &slot in slots {
            self.nodes[slot].set_fault(fault.clone());
        }
    }

    pub fn heal_all(&self) {
        for node in &self.nodes {
            node.heal();
        }
    }
}

pub fn slot_for(node: &Arc<FaultyNode>) -> NodeSlot {
    NodeSlot::new(node.name.clone(), Arc::clone(node) as Arc<dyn ShardNode>)
}

/// Deterministic payload of `size` bytes
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn init_tracing() {
    stripestore_dagnode::metrics::init_metrics();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
