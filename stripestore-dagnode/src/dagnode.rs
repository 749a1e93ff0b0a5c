//! Striped DagNode
//!
//! Stores each block as k data + m parity shards, one per node slot, and
//! reads it back through a two-phase quorum over per-slot metadata:
//! first over errors, then over the reported block size.
//!
//! Every operation is one-shot. The only state carried between calls is
//! the slot binding table, which repair may rebind.

use crate::config::{DagNodeConfig, WritePolicy};
use crate::fanout::fan_out;
use crate::metrics;
use crate::node::ShardNode;
use crate::quorum::{decide, EntryQuorum, READ_IGNORED};
use crate::slots::{NodeSlot, NodeSlotSet};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stripestore_core::{Block, BlockId, ErasureCoder, Result, ShardMeta, SlotFailure, StripeError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Erasure-coded block store over a fixed set of k+m node slots
pub struct StripedDagNode {
    coder: ErasureCoder,
    slots: NodeSlotSet,
    write_policy: WritePolicy,
    slot_timeout: Option<Duration>,
}

impl StripedDagNode {
    /// Create a DagNode over `slots`, which must hold exactly k+m bindings
    pub fn new(data_shards: usize, parity_shards: usize, slots: Vec<NodeSlot>) -> Result<Self> {
        let coder = ErasureCoder::new(data_shards, parity_shards, 0)?;
        let expected = coder.config().total_shards();
        if slots.len() != expected {
            return Err(StripeError::Configuration(format!(
                "expected {} node slots, got {}",
                expected,
                slots.len()
            )));
        }

        Ok(Self {
            coder,
            slots: NodeSlotSet::new(slots),
            write_policy: WritePolicy::default(),
            slot_timeout: None,
        })
    }

    /// Create a DagNode from configuration, connecting each address with
    /// `connect`
    pub fn from_config<C>(config: &DagNodeConfig, mut connect: C) -> Result<Self>
    where
        C: FnMut(&str) -> Result<Arc<dyn ShardNode>>,
    {
        config
            .validate()
            .map_err(|e| StripeError::Configuration(e.to_string()))?;

        let slots = config
            .nodes
            .iter()
            .map(|address| Ok(NodeSlot::new(address.as_str(), connect(address)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(config.data_shards, config.parity_shards, slots)?
            .with_write_policy(config.write_policy)
            .with_slot_timeout(config.slot_timeout()))
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn with_slot_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.slot_timeout = timeout;
        self
    }

    pub fn data_shards(&self) -> usize {
        self.coder.config().data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.coder.config().parity_shards
    }

    pub fn coder(&self) -> &ErasureCoder {
        &self.coder
    }

    pub fn slots(&self) -> &NodeSlotSet {
        &self.slots
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    pub(crate) fn slot_timeout(&self) -> Option<Duration> {
        self.slot_timeout
    }

    /// Read and write quorum for this stripe geometry
    pub fn entry_quorum(&self) -> EntryQuorum {
        EntryQuorum::for_shards(self.data_shards(), self.parity_shards())
    }

    /// Encode a block and write one shard to every slot
    ///
    /// Partially written slots are not rolled back on failure.
    #[instrument(skip(self, cancel, block), fields(block = %block.id(), size = block.size()))]
    pub async fn put(&self, cancel: &CancellationToken, block: &Block) -> Result<()> {
        timed("put", async {
            let meta = Bytes::from(ShardMeta::for_block(block.size())?.encode()?);
            let shards: Vec<Bytes> = self
                .coder
                .encode_data(block.data())?
                .into_iter()
                .map(Bytes::from)
                .collect();
            let key = block.id().to_key();

            let snapshot = self.slots.snapshot().await;
            let outcomes = fan_out(
                "put",
                &snapshot.slots,
                cancel,
                self.slot_timeout,
                |index, client| {
                    let key = key.clone();
                    let meta = meta.clone();
                    let shard = shards[index].clone();
                    async move { client.put(&key, meta, shard).await }
                },
            )
            .await;
            drop(snapshot);

            self.settle_write(cancel, &outcomes)
        })
        .await
    }

    fn settle_write(&self, cancel: &CancellationToken, outcomes: &[Result<()>]) -> Result<()> {
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        let result = match self.write_policy {
            WritePolicy::Quorum if cancel.is_cancelled() => Err(StripeError::canceled()),
            WritePolicy::Quorum if succeeded >= self.entry_quorum().write => Ok(()),
            WritePolicy::Quorum => {
                let required = self.entry_quorum().write;
                decide(cancel, outcomes, &[], required, |_| {
                    StripeError::WriteQuorumNotMet {
                        succeeded,
                        required,
                    }
                })
            }
            WritePolicy::BestEffort if cancel.is_cancelled() => Err(StripeError::canceled()),
            WritePolicy::BestEffort if succeeded > 0 => Ok(()),
            WritePolicy::BestEffort => Err(StripeError::WriteQuorumNotMet {
                succeeded,
                required: 1,
            }),
        };

        if result.is_ok() && succeeded < outcomes.len() {
            warn!(
                succeeded,
                total = outcomes.len(),
                "Block stored with missing shards"
            );
        }
        result
    }

    /// Authoritative size of a block, agreed on by at least k slots
    #[instrument(skip(self, cancel), fields(block = %id))]
    pub async fn get_size(&self, cancel: &CancellationToken, id: &BlockId) -> Result<usize> {
        timed("get_size", async {
            let snapshot = self.slots.snapshot().await;
            self.read_size(cancel, &snapshot.slots, id).await
        })
        .await
    }

    pub(crate) async fn read_size(
        &self,
        cancel: &CancellationToken,
        slots: &[NodeSlot],
        id: &BlockId,
    ) -> Result<usize> {
        let quorum = self.entry_quorum().read;
        if cancel.is_cancelled() {
            return Err(StripeError::canceled());
        }
        if quorum < 2 {
            return Err(StripeError::ReadQuorumNotMet {
                agreeing: 0,
                required: quorum,
                failed: 0,
            });
        }

        let key = id.to_key();
        let metas = fan_out(
            "get_meta",
            slots,
            cancel,
            self.slot_timeout,
            |_index, client| {
                let key = key.clone();
                async move { ShardMeta::decode(&client.get_meta(&key).await?) }
            },
        )
        .await;

        let agreeing = metas.iter().filter(|m| m.is_ok()).count();
        let failed = metas.len() - agreeing;
        let not_found = metas
            .iter()
            .filter(|m| matches!(m, Err(e) if e.is_not_found()))
            .count();
        let unavailable = || {
            if not_found >= quorum {
                StripeError::BlockNotFound(key.clone())
            } else {
                StripeError::ReadQuorumNotMet {
                    agreeing,
                    required: quorum,
                    failed,
                }
            }
        };

        // Phase one: enough slots answered at all. k answers are never
        // outvoted by failing slots, however alike their errors are.
        if agreeing < quorum {
            let errors: Vec<Result<()>> = metas
                .iter()
                .map(|m| m.as_ref().map(|_| ()).map_err(Clone::clone))
                .collect();
            return match decide(cancel, &errors, READ_IGNORED, quorum, |_| unavailable()) {
                Err(e) if e.is_canceled() => Err(e),
                _ => Err(unavailable()),
            };
        }

        // Phase two: enough slots agree on the size
        let values: Vec<Result<ShardMeta>> = metas.into_iter().filter(|m| m.is_ok()).collect();
        let meta = decide(cancel, &values, &[], quorum, |count| {
            StripeError::ReadQuorumNotMet {
                agreeing: count,
                required: quorum,
                failed,
            }
        })?;

        Ok(meta.block_size())
    }

    /// Read, reconstruct and verify a block
    ///
    /// Fails closed: the returned data always hashes to `id`.
    #[instrument(skip(self, cancel), fields(block = %id))]
    pub async fn get(&self, cancel: &CancellationToken, id: &BlockId) -> Result<Block> {
        timed("get", async {
            let snapshot = self.slots.snapshot().await;
            let size = self.read_size(cancel, &snapshot.slots, id).await?;

            let mut shards = self
                .fetch_shards(cancel, &snapshot.slots, &id.to_key(), size, None)
                .await?;
            drop(snapshot);

            self.reconstruct(&mut shards, size, false)?;
            let data = self.assemble(&shards, size);
            Block::from_parts(*id, Bytes::from(data))
        })
        .await
    }

    /// Fetch every slot's shard, leaving `skip` out
    ///
    /// Failed, empty and wrongly sized shards come back as `None`.
    pub(crate) async fn fetch_shards(
        &self,
        cancel: &CancellationToken,
        slots: &[NodeSlot],
        key: &str,
        size: usize,
        skip: Option<usize>,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let shard_len = self.coder.with_block_size(size as i64).shard_size() as usize;
        if shard_len == 0 {
            return Ok(vec![None; slots.len()]);
        }

        let key = key.to_string();
        let fetched = fan_out("get", slots, cancel, self.slot_timeout, |index, client| {
            let key = key.clone();
            async move {
                if skip == Some(index) {
                    return Ok(Bytes::new());
                }
                client.get(&key).await
            }
        })
        .await;

        if cancel.is_cancelled() {
            return Err(StripeError::canceled());
        }

        Ok(fetched
            .into_iter()
            .enumerate()
            .map(|(index, shard)| match shard {
                Ok(shard) if shard.len() == shard_len => Some(shard.to_vec()),
                Ok(shard) if shard.is_empty() => None,
                Ok(shard) => {
                    warn!(
                        slot = index,
                        expected = shard_len,
                        actual = shard.len(),
                        "Discarding shard with unexpected length"
                    );
                    None
                }
                Err(_) => None,
            })
            .collect())
    }

    /// Rebuild missing shards in place; `with_parity` also restores parity
    pub(crate) fn reconstruct(
        &self,
        shards: &mut [Option<Vec<u8>>],
        size: usize,
        with_parity: bool,
    ) -> Result<()> {
        let required = self.data_shards();
        let present = shards.iter().filter(|s| s.is_some()).count();
        // An all-missing stripe decodes as empty, which is only right for size 0
        if size > 0 && present < required {
            return Err(StripeError::InsufficientShards {
                available: present,
                required,
            });
        }
        debug!(present, required, with_parity, "Reconstructing stripe");

        if with_parity {
            self.coder.decode_data_and_parity_blocks(shards)
        } else {
            self.coder.decode_data_blocks(shards)
        }
    }

    /// Concatenate the data shards and cut the padding
    pub(crate) fn assemble(&self, shards: &[Option<Vec<u8>>], size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        for shard in shards.iter().take(self.data_shards()).flatten() {
            data.extend_from_slice(shard);
        }
        data.truncate(size);
        data
    }

    /// Delete a block's shard from every slot
    ///
    /// Every slot is attempted. A slot that never had the shard counts as
    /// deleted; any other failure is reported per slot.
    #[instrument(skip(self, cancel), fields(block = %id))]
    pub async fn delete_block(&self, cancel: &CancellationToken, id: &BlockId) -> Result<()> {
        timed("delete", async {
            let key = id.to_key();
            let snapshot = self.slots.snapshot().await;
            let total = snapshot.slots.len();
            let outcomes = fan_out(
                "delete",
                &snapshot.slots,
                cancel,
                self.slot_timeout,
                |_index, client| {
                    let key = key.clone();
                    async move { client.delete(&key).await }
                },
            )
            .await;
            drop(snapshot);

            if cancel.is_cancelled() {
                return Err(StripeError::canceled());
            }

            let failures: Vec<SlotFailure> = outcomes
                .into_iter()
                .enumerate()
                .filter_map(|(slot, outcome)| match outcome {
                    Err(error) if !error.is_not_found() => Some(SlotFailure { slot, error }),
                    _ => None,
                })
                .collect();

            if failures.is_empty() {
                Ok(())
            } else {
                warn!(failed = failures.len(), total, "Delete failed on some slots");
                Err(StripeError::SlotsFailed { total, failures })
            }
        })
        .await
    }

    /// Check that every slot holds its shard and that parity is consistent
    #[instrument(skip(self, cancel), fields(block = %id))]
    pub async fn verify_block(&self, cancel: &CancellationToken, id: &BlockId) -> Result<bool> {
        timed("verify", async {
            let snapshot = self.slots.snapshot().await;
            let size = self.read_size(cancel, &snapshot.slots, id).await?;
            let shards = self
                .fetch_shards(cancel, &snapshot.slots, &id.to_key(), size, None)
                .await?;
            drop(snapshot);

            if size == 0 {
                return Ok(true);
            }
            let Some(shards) = shards.into_iter().collect::<Option<Vec<_>>>() else {
                return Ok(false);
            };
            if !self.coder.verify_shards(&shards)? {
                return Ok(false);
            }
            Ok(id.verify(&self.assemble(
                &shards.into_iter().map(Some).collect::<Vec<_>>(),
                size,
            )))
        })
        .await
    }
}

pub(crate) async fn timed<T>(op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let started = Instant::now();
    let result = fut.await;
    metrics::record_op(op, result.is_ok(), started.elapsed());
    result
}
