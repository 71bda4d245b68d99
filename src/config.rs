//! Configuration knobs enumerated in spec.md §6. All five are plain
//! durations; a real deployment loads them from CLI flags/env via
//! `Opts` (see `opts.rs`), defaults match the spec.

use time::Duration;

/// The four grace-period knobs spec.md §6 names, plus the
/// `EnqueuingLivenessPeriod` it references without ever giving a default for
/// — we treat that omission as an oversight in the distillation rather than
/// an invitation to hard-code it, and default it to the same 30s cadence as
/// its buffer (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// How often a reconciliation pass runs. Must be >= worker-exit latency
    /// plus the metrics-consistency window.
    pub reconcile_period: Duration,
    /// Hides newly created queues from both the "missing queue" error and GC.
    pub queue_exist_grace_period: Duration,
    /// Cadence at which the enqueuer is expected to refresh its liveness file.
    pub enqueuing_liveness_period: Duration,
    /// Added to `enqueuing_liveness_period` before declaring enqueue failure.
    pub enqueuing_liveness_buffer: Duration,
    /// Hides newly created batches from the "missing batch" error.
    pub k8s_job_existence_grace_period: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            reconcile_period: Duration::seconds(60),
            queue_exist_grace_period: Duration::seconds(30),
            enqueuing_liveness_period: Duration::seconds(30),
            enqueuing_liveness_buffer: Duration::seconds(30),
            k8s_job_existence_grace_period: Duration::seconds(10),
        }
    }
}

impl ReconcileConfig {
    pub fn enqueuing_liveness_timeout(&self) -> Duration {
        self.enqueuing_liveness_period + self.enqueuing_liveness_buffer
    }
}
