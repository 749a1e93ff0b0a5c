//! Per-slot fan-out
//!
//! Runs one task per node slot and waits for all of them. Results come back
//! in a slot-indexed vector; no task writes to shared state. A task that
//! panics is reported as a transport error for its slot.

use crate::metrics;
use crate::node::ShardNode;
use crate::slots::NodeSlot;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stripestore_core::error::{Result, StripeError};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Call `call` once per slot concurrently and collect the outcomes by slot
///
/// Each call races the caller's cancellation token and the optional
/// per-slot timeout.
pub async fn fan_out<T, F, Fut>(
    op: &'static str,
    slots: &[NodeSlot],
    cancel: &CancellationToken,
    slot_timeout: Option<Duration>,
    call: F,
) -> Vec<Result<T>>
where
    F: Fn(usize, Arc<dyn ShardNode>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = slots
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            let request = call(index, Arc::clone(&slot.client));
            tokio::spawn(guarded(op, index, cancel.clone(), slot_timeout, request))
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(index, joined)| settle(op, index, &slots[index].address, joined))
        .collect()
}

/// Run one request against a single slot with the same cancellation,
/// timeout and panic handling as [`fan_out`]
pub async fn call_slot<T, Fut>(
    op: &'static str,
    index: usize,
    slot: &NodeSlot,
    cancel: &CancellationToken,
    slot_timeout: Option<Duration>,
    request: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(guarded(op, index, cancel.clone(), slot_timeout, request));
    settle(op, index, &slot.address, handle.await)
}

async fn guarded<T, Fut>(
    op: &'static str,
    index: usize,
    cancel: CancellationToken,
    slot_timeout: Option<Duration>,
    request: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let bounded = async move {
        match slot_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or_else(|_| {
                    Err(StripeError::SlotTimeout {
                        slot: index,
                        timeout_ms: limit.as_millis() as u64,
                    })
                }),
            None => request.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            Err(StripeError::Canceled(format!("{} on slot {}", op, index)))
        }
        result = bounded => result,
    }
}

fn settle<T>(
    op: &'static str,
    index: usize,
    address: &str,
    joined: std::result::Result<Result<T>, JoinError>,
) -> Result<T> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            if !e.is_not_found() {
                metrics::record_slot_error(op);
            }
            debug!(op, slot = index, address, error = %e, "Slot call failed");
            Err(e)
        }
        Err(join_err) if join_err.is_panic() => {
            metrics::record_slot_panic(op);
            error!(op, slot = index, address, "Slot task panicked");
            Err(StripeError::Transport(format!(
                "slot {}: {} task panicked",
                index, op
            )))
        }
        Err(_) => Err(StripeError::Canceled(format!("{} on slot {}", op, index))),
    }
}
