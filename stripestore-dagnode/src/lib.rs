//! Striped DagNode
//!
//! Content-addressed blocks erasure-coded across a fixed set of k+m storage
//! node slots, with quorum reads, explicit write quorum, aggregated deletes
//! and single-slot repair.

pub mod config;
pub mod dagnode;
pub mod fanout;
pub mod metrics;
pub mod node;
pub mod quorum;
pub mod repair;
pub mod slots;

pub use config::{ConfigError, DagNodeConfig, WritePolicy};
pub use dagnode::StripedDagNode;
pub use node::{LocalNode, ShardNode};
pub use quorum::{decide, reduce_outcomes, EntryQuorum, QuorumOutcome, READ_IGNORED};
pub use repair::RepairReport;
pub use slots::{NodeSlot, NodeSlotSet, SlotSnapshot};

pub use stripestore_core::{Block, BlockId, Result, StripeError};
