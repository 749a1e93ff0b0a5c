//! Reed-Solomon Erasure Coding
//!
//! Systematic (k data, m parity) code over GF(2^8):
//! - shards 0..k are a literal partition of the zero-padded block
//! - shards k..k+m are parity
//! - any k surviving shards reconstruct the block
//!
//! Missing shards are passed to the decoders as `None` (or an empty
//! buffer) and are filled in place.

use crate::error::{Result, StripeError};
use crate::MAX_SHARD_COUNT;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Erasure coding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: usize,
    /// Number of parity shards (m)
    pub parity_shards: usize,
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(StripeError::InvalidShardCount {
                data: data_shards,
                parity: parity_shards,
            });
        }
        let total = data_shards + parity_shards;
        if total > MAX_SHARD_COUNT {
            return Err(StripeError::MaxShardCountExceeded {
                total,
                max: MAX_SHARD_COUNT,
            });
        }
        Ok(Self {
            data_shards,
            parity_shards,
        })
    }

    /// Total number of shards
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }
}

/// Integer ceiling division; a zero denominator yields 0
pub fn ceil_frac(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let (numerator, denominator) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };
    let mut ceil = numerator / denominator;
    if numerator > 0 && numerator % denominator != 0 {
        ceil += 1;
    }
    ceil
}

/// Reed-Solomon coder for a fixed (k, m) pair and block size
///
/// The Galois-field codec is built on first use and shared by every coder
/// derived through [`ErasureCoder::with_block_size`].
#[derive(Clone)]
pub struct ErasureCoder {
    config: ErasureConfig,
    block_size: i64,
    codec: Arc<OnceLock<ReedSolomon>>,
}

impl std::fmt::Debug for ErasureCoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasureCoder")
            .field("config", &self.config)
            .field("block_size", &self.block_size)
            .field("codec_ready", &self.codec.get().is_some())
            .finish()
    }
}

impl ErasureCoder {
    pub fn new(data_shards: usize, parity_shards: usize, block_size: i64) -> Result<Self> {
        Ok(Self::with_config(
            ErasureConfig::new(data_shards, parity_shards)?,
            block_size,
        ))
    }

    pub fn with_config(config: ErasureConfig, block_size: i64) -> Self {
        Self {
            config,
            block_size,
            codec: Arc::new(OnceLock::new()),
        }
    }

    /// A coder for another block size sharing this coder's codec
    pub fn with_block_size(&self, block_size: i64) -> Self {
        Self {
            config: self.config,
            block_size,
            codec: Arc::clone(&self.codec),
        }
    }

    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    pub fn block_size(&self) -> i64 {
        self.block_size
    }

    fn codec(&self) -> Result<&ReedSolomon> {
        if let Some(codec) = self.codec.get() {
            return Ok(codec);
        }
        let codec = ReedSolomon::new(self.config.data_shards, self.config.parity_shards)?;
        Ok(self.codec.get_or_init(|| codec))
    }

    /// Split `data` into k data shards and compute m parity shards
    ///
    /// Empty input yields k+m empty shards without touching the codec.
    pub fn encode_data(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        let total = self.config.total_shards();
        if data.is_empty() {
            return Ok(vec![Vec::new(); total]);
        }

        let shard_size = data.len().div_ceil(self.config.data_shards);
        let mut shards: Vec<Vec<u8>> = Vec::with_capacity(total);
        for piece in data.chunks(shard_size) {
            let mut shard = piece.to_vec();
            shard.resize(shard_size, 0);
            shards.push(shard);
        }
        // Short inputs can leave trailing data shards with no bytes at all
        shards.resize(total, vec![0u8; shard_size]);

        self.codec()?.encode(&mut shards)?;
        Ok(shards)
    }

    /// Reconstruct the k data shards in place
    ///
    /// Succeeds immediately when nothing is missing, or when everything is
    /// missing (an empty payload); callers validate the expected size.
    pub fn decode_data_blocks(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()> {
        let Some(present) = self.prepare(shards)? else {
            return Ok(());
        };
        self.ensure_enough(present)?;
        self.codec()?.reconstruct_data(shards)?;
        Ok(())
    }

    /// Reconstruct every missing shard, data and parity, in place
    pub fn decode_data_and_parity_blocks(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()> {
        let Some(present) = self.prepare(shards)? else {
            return Ok(());
        };
        self.ensure_enough(present)?;
        self.codec()?.reconstruct(shards)?;
        Ok(())
    }

    /// Normalizes empty buffers to `None` and returns the number of present
    /// shards, or `None` when there is nothing to reconstruct.
    fn prepare(&self, shards: &mut [Option<Vec<u8>>]) -> Result<Option<usize>> {
        let total = self.config.total_shards();
        if shards.len() != total {
            return Err(StripeError::ErasureCoding(format!(
                "expected {} shards, got {}",
                total,
                shards.len()
            )));
        }

        for shard in shards.iter_mut() {
            if shard.as_ref().is_some_and(|s| s.is_empty()) {
                *shard = None;
            }
        }

        let present = shards.iter().filter(|s| s.is_some()).count();
        if present == total || present == 0 {
            return Ok(None);
        }
        Ok(Some(present))
    }

    fn ensure_enough(&self, present: usize) -> Result<()> {
        if present < self.config.data_shards {
            return Err(StripeError::InsufficientShards {
                available: present,
                required: self.config.data_shards,
            });
        }
        Ok(())
    }

    /// Check that parity shards are consistent with data shards
    pub fn verify_shards(&self, shards: &[Vec<u8>]) -> Result<bool> {
        if shards.len() != self.config.total_shards() {
            return Ok(false);
        }
        let expected_size = shards.first().map(|s| s.len()).unwrap_or(0);
        if !shards.iter().all(|s| s.len() == expected_size) {
            return Ok(false);
        }
        if expected_size == 0 {
            return Ok(true);
        }
        Ok(self.codec()?.verify(shards)?)
    }

    /// Size of one shard for a block of `block_size` bytes
    pub fn shard_size(&self) -> i64 {
        ceil_frac(self.block_size, self.config.data_shards as i64)
    }

    /// Final size of a shard file holding a stream of `total_length` bytes
    /// coded in `block_size` units; -1 means the length is unknown
    pub fn shard_file_size(&self, total_length: i64) -> i64 {
        if total_length == 0 {
            return 0;
        }
        if total_length == -1 {
            return -1;
        }
        if self.block_size <= 0 {
            return 0;
        }
        let num_blocks = total_length / self.block_size;
        let last_block_size = total_length % self.block_size;
        let last_shard_size = ceil_frac(last_block_size, self.config.data_shards as i64);
        num_blocks * self.shard_size() + last_shard_size
    }

    /// End offset (exclusive) in the shard file covering the logical range
    /// `[start_offset, start_offset + length)`
    pub fn shard_file_offset(&self, start_offset: i64, length: i64, total_length: i64) -> i64 {
        if self.block_size <= 0 {
            return 0;
        }
        let shard_size = self.shard_size();
        let shard_file_size = self.shard_file_size(total_length);
        let end_shard = (start_offset + length) / self.block_size;
        let till_offset = end_shard * shard_size + shard_size;
        if till_offset > shard_file_size {
            return shard_file_size;
        }
        till_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn options(shards: Vec<Vec<u8>>) -> Vec<Option<Vec<u8>>> {
        shards.into_iter().map(Some).collect()
    }

    fn join_data(shards: &[Option<Vec<u8>>], k: usize, size: usize) -> Vec<u8> {
        let mut out: Vec<u8> = shards
            .iter()
            .take(k)
            .flat_map(|s| s.clone().unwrap_or_default())
            .collect();
        out.truncate(size);
        out
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            ErasureCoder::new(0, 2, 10),
            Err(StripeError::InvalidShardCount { .. })
        ));
        assert!(matches!(
            ErasureCoder::new(2, 0, 10),
            Err(StripeError::InvalidShardCount { .. })
        ));
        assert!(matches!(
            ErasureCoder::new(200, 57, 10),
            Err(StripeError::MaxShardCountExceeded { total: 257, .. })
        ));
        assert!(ErasureCoder::new(200, 56, 10).is_ok());
    }

    #[test]
    fn test_shard_size() {
        let coder = ErasureCoder::new(3, 2, 10).unwrap();
        assert_eq!(coder.shard_size(), 4);
        assert_eq!(coder.with_block_size(0).shard_size(), 0);
        assert_eq!(coder.with_block_size(9).shard_size(), 3);
    }

    #[test]
    fn test_empty_data_skips_codec() {
        let coder = ErasureCoder::new(3, 2, 0).unwrap();
        let shards = coder.encode_data(b"").unwrap();
        assert_eq!(shards.len(), 5);
        assert!(shards.iter().all(|s| s.is_empty()));
        assert!(coder.codec.get().is_none());
    }

    #[test]
    fn test_encode_is_systematic() {
        let coder = ErasureCoder::new(2, 1, 11).unwrap();
        let shards = coder.encode_data(b"hello world").unwrap();
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0], b"hello ".to_vec());
        assert_eq!(shards[1], b"world\0".to_vec());
        assert!(coder.verify_shards(&shards).unwrap());
    }

    #[test]
    fn test_tiny_input_pads_missing_data_shards() {
        let coder = ErasureCoder::new(4, 2, 1).unwrap();
        let shards = coder.encode_data(b"x").unwrap();
        assert_eq!(shards.len(), 6);
        assert!(shards.iter().all(|s| s.len() == 1));
        assert_eq!(shards[0], b"x".to_vec());
        assert_eq!(shards[3], vec![0]);
    }

    #[test]
    fn test_decode_data_with_missing_shards() {
        let coder = ErasureCoder::new(4, 2, 0).unwrap();
        let original: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let mut shards = options(coder.encode_data(&original).unwrap());
        shards[0] = None;
        shards[3] = Some(Vec::new());

        coder.decode_data_blocks(&mut shards).unwrap();
        assert_eq!(join_data(&shards, 4, original.len()), original);
    }

    #[test]
    fn test_decode_data_leaves_parity_missing() {
        let coder = ErasureCoder::new(2, 2, 0).unwrap();
        let mut shards = options(coder.encode_data(b"parity stays missing").unwrap());
        shards[1] = None;
        shards[3] = None;

        coder.decode_data_blocks(&mut shards).unwrap();
        assert!(shards[1].is_some());
        assert!(shards[3].is_none());
    }

    #[test]
    fn test_decode_data_and_parity() {
        let coder = ErasureCoder::new(2, 2, 0).unwrap();
        let encoded = coder.encode_data(b"rebuild the parity too").unwrap();
        let mut shards = options(encoded.clone());
        shards[0] = None;
        shards[3] = None;

        coder.decode_data_and_parity_blocks(&mut shards).unwrap();
        let rebuilt: Vec<Vec<u8>> = shards.into_iter().map(|s| s.unwrap()).collect();
        assert_eq!(rebuilt, encoded);
    }

    #[test]
    fn test_too_many_missing_shards() {
        let coder = ErasureCoder::new(3, 2, 0).unwrap();
        let mut shards = options(coder.encode_data(b"test data").unwrap());
        shards[0] = None;
        shards[1] = None;
        shards[4] = None;

        assert!(matches!(
            coder.decode_data_blocks(&mut shards),
            Err(StripeError::InsufficientShards {
                available: 2,
                required: 3
            })
        ));
    }

    #[test]
    fn test_all_missing_is_empty_payload() {
        let coder = ErasureCoder::new(3, 2, 0).unwrap();
        let mut shards = vec![None; 5];
        coder.decode_data_blocks(&mut shards).unwrap();
        assert!(shards.iter().all(|s| s.is_none()));
    }

    #[test]
    fn test_wrong_shard_vector_length() {
        let coder = ErasureCoder::new(3, 2, 0).unwrap();
        let mut shards = vec![None; 4];
        assert!(matches!(
            coder.decode_data_blocks(&mut shards),
            Err(StripeError::ErasureCoding(_))
        ));
    }

    #[test]
    fn test_verify_detects_corruption() {
        let coder = ErasureCoder::new(3, 2, 0).unwrap();
        let mut shards = coder.encode_data(b"verify test").unwrap();
        assert!(coder.verify_shards(&shards).unwrap());
        shards[0][0] ^= 0xFF;
        assert!(!coder.verify_shards(&shards).unwrap());
    }

    #[test]
    fn test_codec_shared_between_block_sizes() {
        let coder = ErasureCoder::new(2, 1, 0).unwrap();
        let derived = coder.with_block_size(64);
        derived.encode_data(&[1u8; 64]).unwrap();
        assert!(coder.codec.get().is_some());
    }

    #[test]
    fn test_ceil_frac() {
        assert_eq!(ceil_frac(10, 3), 4);
        assert_eq!(ceil_frac(9, 3), 3);
        assert_eq!(ceil_frac(0, 3), 0);
        assert_eq!(ceil_frac(5, 0), 0);
        assert_eq!(ceil_frac(-10, 3), -3);
        assert_eq!(ceil_frac(10, -3), -3);
    }

    #[test]
    fn test_shard_file_size() {
        // 1 MiB blocks, k = 4
        let coder = ErasureCoder::new(4, 2, 1 << 20).unwrap();
        assert_eq!(coder.shard_file_size(0), 0);
        assert_eq!(coder.shard_file_size(-1), -1);
        assert_eq!(coder.shard_file_size(1 << 20), 1 << 18);
        assert_eq!(coder.shard_file_size((1 << 20) + 5), (1 << 18) + 2);
    }

    #[test]
    fn test_shard_file_offset() {
        let coder = ErasureCoder::new(4, 2, 100).unwrap();
        let total = 250; // shard file: 25 + 25 + 13 = 63
        assert_eq!(coder.shard_file_size(total), 63);
        assert_eq!(coder.shard_file_offset(0, 10, total), 25);
        assert_eq!(coder.shard_file_offset(120, 10, total), 50);
        assert_eq!(coder.shard_file_offset(200, 50, total), 63);
        assert_eq!(coder.shard_file_offset(0, 10, -1), -1);
    }

    proptest! {
        #[test]
        fn prop_ceil_frac_is_ceiling(n in 0i64..1_000_000, d in 1i64..1_000) {
            let c = ceil_frac(n, d);
            prop_assert!(c * d >= n);
            prop_assert!((c - 1) * d < n || n == 0);
        }

        #[test]
        fn prop_shard_file_offset_within_file(
            block in 1i64..4096,
            total in 1i64..100_000,
            start_frac in 0.0f64..1.0,
        ) {
            let coder = ErasureCoder::new(3, 2, block).unwrap();
            let start = ((total - 1) as f64 * start_frac) as i64;
            let length = total - start;
            let till = coder.shard_file_offset(start, length, total);
            prop_assert!(till <= coder.shard_file_size(total));
            prop_assert!(till >= 0);
        }
    }
}
