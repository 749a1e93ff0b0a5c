//! stripestore Core Library
//!
//! Core abstractions for the stripestore erasure-coded block store.
//! This crate provides:
//! - Reed-Solomon erasure coding over a configurable (k, m) pair
//! - Content-addressed block identifiers (Blake3 or SHA-256)
//! - The fixed-width per-shard metadata record
//! - Common error handling

pub mod block;
pub mod erasure;
pub mod error;
pub mod hash;
pub mod shard_meta;

pub use block::{Block, BlockId};
pub use erasure::{ceil_frac, ErasureCoder, ErasureConfig};
pub use error::{ErrorKind, Result, SlotFailure, StripeError};
pub use hash::{ContentHash, HashAlgorithm};
pub use shard_meta::{ShardMeta, SHARD_META_LEN};

/// Default erasure coding configuration
/// - 4 data shards: minimum required to reconstruct
/// - 2 parity shards: can tolerate 2 node failures
/// - 6 total shards, one per node slot
pub const DATA_SHARDS: usize = 4;
pub const PARITY_SHARDS: usize = 2;

/// GF(2^8) limits a stripe to 256 shards
pub const MAX_SHARD_COUNT: usize = 256;
