//! In-process pass telemetry. Autoscaling/dashboards are non-goals, but
//! counting what a pass actually did is the ambient act of "report via
//! telemetry... and continue" spec.md §7 asks for, not a feature the
//! Non-goals exclude.

use std::collections::HashMap;

use crate::model::JobStatus;

#[derive(Debug, Default, Clone)]
pub struct ReconcilerTelemetry {
    pub passes_run: u64,
    pub transitions: HashMap<JobStatus, u64>,
    pub orphan_batches_deleted: u64,
    pub orphan_queues_deleted: u64,
    pub collaborator_errors: HashMap<&'static str, u64>,
}

impl ReconcilerTelemetry {
    pub fn record_transition(&mut self, status: JobStatus) {
        *self.transitions.entry(status).or_default() += 1;
    }

    pub fn record_error(&mut self, kind: &'static str) {
        *self.collaborator_errors.entry(kind).or_default() += 1;
    }
}
