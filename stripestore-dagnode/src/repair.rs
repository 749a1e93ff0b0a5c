//! Slot repair
//!
//! Walks the key space of one healthy slot and rebuilds the shard owed to
//! another slot from the rest of the stripe. Keys the target already holds
//! are skipped, so re-running a repair only fills what is still missing.
//!
//! The scan is a single pass. Any failure aborts it and a retry starts
//! over from the first key.

use crate::dagnode::{timed, StripedDagNode};
use crate::fanout::call_slot;
use crate::metrics;
use crate::slots::NodeSlot;
use bytes::Bytes;
use futures::StreamExt;
use stripestore_core::{Block, BlockId, Result, ShardMeta, StripeError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Summary of one repair pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Keys read from the source slot
    pub scanned: usize,
    /// Shards rebuilt and written to the repaired slot
    pub repaired: usize,
    /// Keys the repaired slot already held
    pub skipped: usize,
    pub bytes_written: u64,
}

impl StripedDagNode {
    /// Rebuild every shard `repair_slot` is missing, using the keys held by
    /// `from_slot`
    #[instrument(skip(self, cancel))]
    pub async fn repair_data_node(
        &self,
        cancel: &CancellationToken,
        from_slot: usize,
        repair_slot: usize,
    ) -> Result<RepairReport> {
        timed("repair", async {
            let total = self.slots().len();
            for index in [from_slot, repair_slot] {
                if index >= total {
                    return Err(StripeError::InvalidSlot { index, total });
                }
            }

            let source = self.slots().current()[from_slot].client.clone();
            let mut keys = source.all_keys();
            let mut report = RepairReport::default();

            while let Some(key) = keys.next().await {
                if cancel.is_cancelled() {
                    return Err(StripeError::canceled());
                }
                let key = key?;
                report.scanned += 1;

                // Fresh snapshot per key so a rebind can slip in between keys
                let snapshot = self.slots().snapshot().await;
                match self
                    .repair_key(cancel, &snapshot.slots, &key, repair_slot)
                    .await?
                {
                    Some(written) => {
                        metrics::record_repair("repaired");
                        report.repaired += 1;
                        report.bytes_written += written;
                    }
                    None => {
                        metrics::record_repair("skipped");
                        report.skipped += 1;
                    }
                }
            }

            info!(
                from_slot,
                repair_slot,
                scanned = report.scanned,
                repaired = report.repaired,
                skipped = report.skipped,
                bytes_written = report.bytes_written,
                "Repair pass complete"
            );
            Ok(report)
        })
        .await
    }

    /// Bind `slot` at `index`, then fill it from `from_slot`
    pub async fn replace_and_repair(
        &self,
        cancel: &CancellationToken,
        from_slot: usize,
        index: usize,
        slot: NodeSlot,
    ) -> Result<RepairReport> {
        self.slots().rebind(index, slot).await?;
        self.repair_data_node(cancel, from_slot, index).await
    }

    /// Returns the bytes written, or `None` when the slot already has the key
    async fn repair_key(
        &self,
        cancel: &CancellationToken,
        slots: &[NodeSlot],
        key: &str,
        repair_slot: usize,
    ) -> Result<Option<u64>> {
        let target = &slots[repair_slot];
        let probe = {
            let client = target.client.clone();
            let key = key.to_string();
            call_slot("get_meta", repair_slot, target, cancel, self.slot_timeout(), async move {
                client.get_meta(&key).await
            })
            .await
        };
        if probe.is_ok() {
            return Ok(None);
        }

        let id = BlockId::from_key(key)?;
        let size = self.read_size(cancel, slots, &id).await?;
        let mut shards = self
            .fetch_shards(cancel, slots, key, size, Some(repair_slot))
            .await?;
        // Data shards come straight out of the data decode; parity needs the
        // full one
        let with_parity = repair_slot >= self.data_shards();
        self.reconstruct(&mut shards, size, with_parity)?;

        Block::from_parts(id, Bytes::from(self.assemble(&shards, size)))?;

        let shard = match shards[repair_slot].take() {
            Some(shard) => Bytes::from(shard),
            None if size == 0 => Bytes::new(),
            None => {
                return Err(StripeError::ErasureCoding(format!(
                    "slot {} shard was not reconstructed",
                    repair_slot
                )));
            }
        };
        let written = shard.len() as u64;
        let meta = Bytes::from(ShardMeta::for_block(size)?.encode()?);

        let client = target.client.clone();
        let owned_key = key.to_string();
        call_slot("put", repair_slot, target, cancel, self.slot_timeout(), async move {
            client.put(&owned_key, meta, shard).await
        })
        .await?;

        debug!(key, slot = repair_slot, bytes = written, "Repaired shard");
        Ok(Some(written))
    }
}
