//! Node slot bindings
//!
//! A DagNode fans out to a fixed, ordered list of k+m node slots. The
//! binding table is an immutable `Arc<[NodeSlot]>`; operations take a
//! snapshot and never lock it again. Rebinding one slot swaps in a new
//! table, but only once every in-flight fan-out has released the gate.

use crate::node::ShardNode;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use stripestore_core::error::{Result, StripeError};
use tokio::sync::{RwLock as GateLock, RwLockReadGuard};
use tracing::info;

/// One node binding: an address and the client that reaches it
#[derive(Clone)]
pub struct NodeSlot {
    pub address: String,
    pub client: Arc<dyn ShardNode>,
}

impl NodeSlot {
    pub fn new(address: impl Into<String>, client: Arc<dyn ShardNode>) -> Self {
        Self {
            address: address.into(),
            client,
        }
    }
}

impl fmt::Debug for NodeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSlot")
            .field("address", &self.address)
            .finish()
    }
}

/// Ordered slot bindings shared by every operation on a DagNode
pub struct NodeSlotSet {
    bindings: RwLock<Arc<[NodeSlot]>>,
    gate: GateLock<()>,
}

/// A consistent view of the bindings, held for the duration of one fan-out
pub struct SlotSnapshot<'a> {
    pub slots: Arc<[NodeSlot]>,
    _guard: RwLockReadGuard<'a, ()>,
}

impl NodeSlotSet {
    pub fn new(slots: Vec<NodeSlot>) -> Self {
        Self {
            bindings: RwLock::new(slots.into()),
            gate: GateLock::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bindings without blocking rebinds
    pub fn current(&self) -> Arc<[NodeSlot]> {
        Arc::clone(&self.bindings.read())
    }

    /// Bindings pinned against concurrent rebinds until the snapshot drops
    pub async fn snapshot(&self) -> SlotSnapshot<'_> {
        let guard = self.gate.read().await;
        SlotSnapshot {
            slots: self.current(),
            _guard: guard,
        }
    }

    /// Addresses in slot order
    pub fn addresses(&self) -> Vec<String> {
        self.current().iter().map(|s| s.address.clone()).collect()
    }

    /// Replace the binding at `index`, waiting for in-flight fan-outs
    pub async fn rebind(&self, index: usize, slot: NodeSlot) -> Result<NodeSlot> {
        let _exclusive = self.gate.write().await;

        let mut bindings = self.bindings.write();
        if index >= bindings.len() {
            return Err(StripeError::InvalidSlot {
                index,
                total: bindings.len(),
            });
        }

        let mut next: Vec<NodeSlot> = bindings.iter().cloned().collect();
        let previous = std::mem::replace(&mut next[index], slot);
        info!(
            slot = index,
            from = %previous.address,
            to = %next[index].address,
            "Rebound node slot"
        );
        *bindings = next.into();
        Ok(previous)
    }
}
