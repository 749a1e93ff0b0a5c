//! Per-shard metadata
//!
//! Stored by every node next to the shard it describes. The encoding is a
//! fixed-width little-endian `i32` and is shared with existing node stores,
//! so the layout must not change.

use crate::error::{Result, StripeError};
use serde::{Deserialize, Serialize};

/// Encoded size of [`ShardMeta`] in bytes
pub const SHARD_META_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardMeta {
    /// Size of the original block in bytes
    pub block_size: i32,
}

impl ShardMeta {
    /// Build metadata for a block of `size` bytes
    pub fn for_block(size: usize) -> Result<Self> {
        let block_size = i32::try_from(size).map_err(|_| StripeError::BlockTooLarge {
            size,
            max: i32::MAX as usize,
        })?;
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        // decode() rejects negative sizes
        self.block_size.max(0) as usize
    }

    /// bincode's default options use fixed-width little-endian integers
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        debug_assert_eq!(bytes.len(), SHARD_META_LEN);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SHARD_META_LEN {
            return Err(StripeError::InvalidShardMeta(format!(
                "expected {} bytes, got {}",
                SHARD_META_LEN,
                bytes.len()
            )));
        }
        let meta: ShardMeta = bincode::deserialize(bytes)?;
        if meta.block_size < 0 {
            return Err(StripeError::InvalidShardMeta(format!(
                "negative block size {}",
                meta.block_size
            )));
        }
        Ok(meta)
    }
}
