//! Block types
//!
//! A block is an immutable, content-addressed payload. Its id embeds the
//! hash algorithm, so `hash(data) == id` can be checked on every read.

use crate::error::{Result, StripeError};
use crate::hash::{ContentHash, HashAlgorithm, DIGEST_LEN};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-addressed block identifier
///
/// Key format: base58 of `[multicodec code] ++ digest`.
/// Example: `2DrjgbN3Y5AHN4inRXnff2MrzqXJC1JYopNtXmMTBCryX`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(ContentHash);

impl BlockId {
    /// Compute the id of data with the default algorithm (Blake3)
    pub fn from_data(data: &[u8]) -> Self {
        Self::compute(HashAlgorithm::default(), data)
    }

    /// Compute the id of data with a specific algorithm
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        Self(ContentHash::compute(algorithm, data))
    }

    pub fn hash(&self) -> &ContentHash {
        &self.0
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.0.algorithm()
    }

    /// Check `data` against this id using the id's own algorithm
    pub fn verify(&self, data: &[u8]) -> bool {
        self.0.verify(data)
    }

    /// Canonical string key used on every node slot
    pub fn to_key(&self) -> String {
        let mut raw = Vec::with_capacity(DIGEST_LEN + 1);
        raw.push(self.0.algorithm().code());
        raw.extend_from_slice(self.0.as_bytes());
        bs58::encode(raw).into_string()
    }

    /// Parse a key produced by [`BlockId::to_key`]
    pub fn from_key(key: &str) -> Result<Self> {
        let raw = bs58::decode(key)
            .into_vec()
            .map_err(|e| StripeError::InvalidBlockId(e.to_string()))?;

        if raw.len() != DIGEST_LEN + 1 {
            return Err(StripeError::InvalidBlockId(format!(
                "Invalid length: expected {}, got {}",
                DIGEST_LEN + 1,
                raw.len()
            )));
        }

        let algorithm = HashAlgorithm::from_code(raw[0])?;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&raw[1..]);
        Ok(Self(ContentHash::from_parts(algorithm, digest)))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", &self.to_key()[..8])
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// An immutable block: payload plus its content address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: BlockId,
    data: Bytes,
}

impl Block {
    /// Create a block, deriving its id from the payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = BlockId::from_data(&data);
        Self { id, data }
    }

    /// Create a block with a caller-chosen hash algorithm
    pub fn with_algorithm(algorithm: HashAlgorithm, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = BlockId::compute(algorithm, &data);
        Self { id, data }
    }

    /// Pair an id with data, checking that they agree
    pub fn from_parts(id: BlockId, data: Bytes) -> Result<Self> {
        if !id.verify(&data) {
            return Err(StripeError::HashMismatch {
                expected: id.to_key(),
                actual: BlockId::compute(id.algorithm(), &data).to_key(),
            });
        }
        Ok(Self { id, data })
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
