//! Metrics for DagNode operations
//!
//! Recorded through the `metrics` facade; installing an exporter is up to
//! the embedding process.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names as constants
pub mod names {
    pub const OPS_TOTAL: &str = "stripestore_dagnode_ops_total";
    pub const OP_DURATION: &str = "stripestore_dagnode_op_duration_seconds";
    pub const SLOT_ERRORS: &str = "stripestore_slot_errors_total";
    pub const SLOT_PANICS: &str = "stripestore_slot_panics_total";
    pub const REPAIR_SHARDS: &str = "stripestore_repair_shards_total";
}

/// Initialize metric descriptions
pub fn init_metrics() {
    describe_counter!(names::OPS_TOTAL, "DagNode operations by operation and outcome");
    describe_histogram!(names::OP_DURATION, "DagNode operation duration in seconds");
    describe_counter!(names::SLOT_ERRORS, "Per-slot errors absorbed during fan-out");
    describe_counter!(
        names::SLOT_PANICS,
        "Per-slot tasks that panicked and were converted to errors"
    );
    describe_counter!(names::REPAIR_SHARDS, "Shards handled by repair, by outcome");
}

pub fn record_op(op: &'static str, ok: bool, elapsed: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(names::OPS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
    histogram!(names::OP_DURATION, "op" => op).record(elapsed.as_secs_f64());
}

pub fn record_slot_error(op: &'static str) {
    counter!(names::SLOT_ERRORS, "op" => op).increment(1);
}

pub fn record_slot_panic(op: &'static str) {
    counter!(names::SLOT_PANICS, "op" => op).increment(1);
}

pub fn record_repair(outcome: &'static str) {
    counter!(names::REPAIR_SHARDS, "outcome" => outcome).increment(1);
}
