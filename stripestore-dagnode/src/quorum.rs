//! Quorum reduction for per-slot outcomes
//!
//! Every fan-out produces one outcome per node slot. The reducer groups
//! equal outcomes (successes with equal values, or equal errors) and picks
//! the most frequent one; [`decide`] then accepts it only if it reaches the
//! quorum. A plurality below quorum is always a failure.

use stripestore_core::error::{ErrorKind, Result, StripeError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Error classes that never count towards a quorum
pub const READ_IGNORED: &[ErrorKind] = &[ErrorKind::NotFound, ErrorKind::AccessDenied];

/// The most frequent outcome and how many slots reported it
#[derive(Debug, Clone, PartialEq)]
pub struct QuorumOutcome<T> {
    pub winner: Result<T>,
    pub count: usize,
}

/// Read/write quorum for a (k, m) stripe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryQuorum {
    pub read: usize,
    pub write: usize,
}

impl EntryQuorum {
    /// Read quorum is k. Write quorum is k, or k+1 when k == m so that two
    /// disjoint sets of k slots can never both hold a winning write.
    pub fn for_shards(data_shards: usize, parity_shards: usize) -> Self {
        let write = if data_shards == parity_shards {
            data_shards + 1
        } else {
            data_shards
        };
        Self {
            read: data_shards,
            write,
        }
    }
}

/// Group outcomes by equality and return the most frequent one
///
/// - errors whose kind is in `ignored` are left out entirely
/// - every canceled error collapses into one canonical canceled outcome
/// - on a tie, a success beats a failure; otherwise the first seen wins
///
/// Returns `None` when every outcome was ignored.
pub fn reduce_outcomes<T>(
    outcomes: &[Result<T>],
    ignored: &[ErrorKind],
) -> Option<QuorumOutcome<T>>
where
    T: Clone + PartialEq,
{
    let mut groups: Vec<(Result<T>, usize)> = Vec::new();

    for outcome in outcomes {
        let vote = match outcome {
            Err(e) if ignored.contains(&e.kind()) => continue,
            Err(e) if e.is_canceled() => Err(StripeError::canceled()),
            other => other.clone(),
        };
        match groups.iter_mut().find(|(v, _)| *v == vote) {
            Some((_, count)) => *count += 1,
            None => groups.push((vote, 1)),
        }
    }

    let mut best: Option<(Result<T>, usize)> = None;
    for (vote, count) in groups {
        let replace = match &best {
            None => true,
            Some((best_vote, best_count)) => {
                count > *best_count || (count == *best_count && vote.is_ok() && best_vote.is_err())
            }
        };
        if replace {
            best = Some((vote, count));
        }
    }

    best.map(|(winner, count)| QuorumOutcome { winner, count })
}

/// Reduce outcomes and accept the winner only if it reaches `quorum`
///
/// A canceled context short-circuits to the canceled outcome. Below quorum,
/// `fallback` builds the failure from the winning count.
pub fn decide<T, F>(
    cancel: &CancellationToken,
    outcomes: &[Result<T>],
    ignored: &[ErrorKind],
    quorum: usize,
    fallback: F,
) -> Result<T>
where
    T: Clone + PartialEq,
    F: FnOnce(usize) -> StripeError,
{
    if cancel.is_cancelled() {
        return Err(StripeError::canceled());
    }

    match reduce_outcomes(outcomes, ignored) {
        Some(outcome) if outcome.count >= quorum => outcome.winner,
        Some(outcome) => {
            debug!(
                count = outcome.count,
                quorum,
                slots = outcomes.len(),
                "Quorum not reached"
            );
            Err(fallback(outcome.count))
        }
        None => {
            debug!(quorum, slots = outcomes.len(), "All slot outcomes ignored");
            Err(fallback(0))
        }
    }
}
