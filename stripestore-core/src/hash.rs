//! Content hashing
//!
//! Blocks are addressed by the hash of their payload. The algorithm is
//! carried alongside the digest so a block id can always be re-verified.

use crate::error::{Result, StripeError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest length shared by every supported algorithm
pub const DIGEST_LEN: usize = 32;

/// Payloads above this size are hashed with Blake3's multi-threaded path
const PARALLEL_HASH_THRESHOLD: usize = 1024 * 1024;

/// Supported content hash algorithms
///
/// The discriminant is the multicodec code used as the first byte of a
/// block key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl HashAlgorithm {
    pub fn code(&self) -> u8 {
        match self {
            HashAlgorithm::Blake3 => 0x1e,
            HashAlgorithm::Sha256 => 0x12,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x1e => Ok(HashAlgorithm::Blake3),
            0x12 => Ok(HashAlgorithm::Sha256),
            other => Err(StripeError::InvalidBlockId(format!(
                "unknown hash code 0x{:02x}",
                other
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Blake3 => write!(f, "blake3"),
            HashAlgorithm::Sha256 => write!(f, "sha2-256"),
        }
    }
}

/// A digest tagged with the algorithm that produced it
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    digest: [u8; DIGEST_LEN],
}

impl ContentHash {
    /// Hash data with the given algorithm
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let digest = match algorithm {
            HashAlgorithm::Blake3 if data.len() >= PARALLEL_HASH_THRESHOLD => {
                let mut hasher = blake3::Hasher::new();
                hasher.update_rayon(data);
                *hasher.finalize().as_bytes()
            }
            HashAlgorithm::Blake3 => *blake3::hash(data).as_bytes(),
            HashAlgorithm::Sha256 => Sha256::digest(data).into(),
        };
        Self { algorithm, digest }
    }

    pub fn from_parts(algorithm: HashAlgorithm, digest: [u8; DIGEST_LEN]) -> Self {
        Self { algorithm, digest }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Get the raw digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Verify that data matches this hash under the same algorithm
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(self.algorithm, data) == *self
    }

    /// Hex form of the digest
    pub fn to_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}:{})", self.algorithm, &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}
