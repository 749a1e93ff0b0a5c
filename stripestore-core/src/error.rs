//! Error types for stripestore
//!
//! Provides a unified error type for all stripestore operations.
//!
//! The type is `Clone + Eq + Hash` so per-slot outcomes can be grouped by
//! equality when reducing them to a quorum decision.

use thiserror::Error;

/// Result type alias for stripestore operations
pub type Result<T> = std::result::Result<T, StripeError>;

/// Coarse classification of a [`StripeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid shard counts or settings; fatal, no retry path
    Configuration,
    /// Read or write quorum not met; retry later
    Quorum,
    /// Data decoded but does not match its id
    Corruption,
    /// Key absent on a slot (or on enough slots to call the block missing)
    NotFound,
    /// Slot refused the request
    AccessDenied,
    /// Caller canceled the operation
    Canceled,
    /// Slot unreachable, timed out, or its task failed
    Transport,
    /// Reed-Solomon encode/reconstruct failure
    Codec,
    /// Local storage or serialization failure
    Storage,
    /// Malformed caller input (ids, slot indices, sizes)
    InvalidInput,
}

/// A single slot that failed during a fan-out
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotFailure {
    pub slot: usize,
    pub error: StripeError,
}

impl std::fmt::Display for SlotFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {}: {}", self.slot, self.error)
    }
}

/// Unified error type for stripestore
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum StripeError {
    // ===== Configuration Errors =====
    #[error("invalid shard count: data={data}, parity={parity}")]
    InvalidShardCount { data: usize, parity: usize },

    #[error("max shard count exceeded: {total} > {max}")]
    MaxShardCountExceeded { total: usize, max: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Quorum Errors =====
    #[error("read quorum not met: {agreeing}/{required} slots agree ({failed} failed)")]
    ReadQuorumNotMet {
        agreeing: usize,
        required: usize,
        failed: usize,
    },

    #[error("write quorum not met: {succeeded}/{required} slots stored the shard")]
    WriteQuorumNotMet { succeeded: usize, required: usize },

    #[error("{} of {total} slots failed: {}", failures.len(), join_failures(failures))]
    SlotsFailed {
        total: usize,
        failures: Vec<SlotFailure>,
    },

    // ===== Corruption Errors =====
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Invalid shard metadata: {0}")]
    InvalidShardMeta(String),

    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    // ===== Lookup Errors =====
    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("key not found on slot: {0}")]
    SlotKeyNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    // ===== Transport Errors =====
    #[error("request canceled: {0}")]
    Canceled(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("slot {slot} timed out after {timeout_ms}ms")]
    SlotTimeout { slot: usize, timeout_ms: u64 },

    // ===== Input Errors =====
    #[error("Invalid slot index: {index} (slots: {total})")]
    InvalidSlot { index: usize, total: usize },

    #[error("Invalid block ID: {0}")]
    InvalidBlockId(String),

    #[error("Block too large: {size} bytes (max: {max})")]
    BlockTooLarge { size: usize, max: usize },

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage full: {used} / {capacity} bytes")]
    StorageFull { used: u64, capacity: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn join_failures(failures: &[SlotFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl StripeError {
    /// The canonical cancellation outcome; every canceled slot collapses to it
    pub fn canceled() -> Self {
        StripeError::Canceled("operation canceled".to_string())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StripeError::InvalidShardCount { .. }
            | StripeError::MaxShardCountExceeded { .. }
            | StripeError::Configuration(_) => ErrorKind::Configuration,
            StripeError::ReadQuorumNotMet { .. }
            | StripeError::WriteQuorumNotMet { .. }
            | StripeError::SlotsFailed { .. } => ErrorKind::Quorum,
            StripeError::HashMismatch { .. } | StripeError::InvalidShardMeta(_) => {
                ErrorKind::Corruption
            }
            StripeError::ErasureCoding(_) | StripeError::InsufficientShards { .. } => {
                ErrorKind::Codec
            }
            StripeError::BlockNotFound(_) | StripeError::SlotKeyNotFound(_) => ErrorKind::NotFound,
            StripeError::AccessDenied(_) => ErrorKind::AccessDenied,
            StripeError::Canceled(_) => ErrorKind::Canceled,
            StripeError::Transport(_) | StripeError::SlotTimeout { .. } => ErrorKind::Transport,
            StripeError::InvalidSlot { .. }
            | StripeError::InvalidBlockId(_)
            | StripeError::BlockTooLarge { .. } => ErrorKind::InvalidInput,
            StripeError::Storage(_)
            | StripeError::StorageFull { .. }
            | StripeError::Serialization(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_canceled(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }
}

impl From<reed_solomon_erasure::Error> for StripeError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        match err {
            reed_solomon_erasure::Error::TooFewShardsPresent => StripeError::ErasureCoding(
                "reconstruction failed: too few shards present".to_string(),
            ),
            other => StripeError::ErasureCoding(other.to_string()),
        }
    }
}

impl From<bincode::Error> for StripeError {
    fn from(err: bincode::Error) -> Self {
        StripeError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StripeError {
    fn from(err: std::io::Error) -> Self {
        StripeError::Storage(err.to_string())
    }
}
