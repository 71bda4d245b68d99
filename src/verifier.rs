//! State-Consistency Verifier (spec.md §4.2). Tri-state classification via
//! grace windows: each external system's consistency bound is a named
//! duration compared against `last_updated[phase]`, rather than an ad-hoc
//! sleep. Rules are evaluated in order; the first match wins.

use time::OffsetDateTime;

use crate::config::ReconcileConfig;
use crate::model::{JobPhase, JobState, JobStatus, OrchestratorBatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Unchanged,
    Transition { status: JobStatus, message: String },
}

pub fn verify(
    job: &JobState,
    queue_url: Option<&str>,
    batch: Option<&OrchestratorBatch>,
    cfg: &ReconcileConfig,
    now: OffsetDateTime,
) -> Verification {
    if queue_url.is_none() {
        let enqueuing_since = job.last_updated_or(JobPhase::Enqueuing, now);
        if now - enqueuing_since <= cfg.queue_exist_grace_period {
            return Verification::Unchanged;
        }
        return Verification::Transition {
            status: JobStatus::UnexpectedError,
            message: format!("sqs queue with url {} was not found", job.key),
        };
    }

    if job.status == JobStatus::Enqueuing {
        let liveness_since = job.last_updated_or(JobPhase::LivenessFile, now);
        if now - liveness_since >= cfg.enqueuing_liveness_timeout() {
            return Verification::Transition {
                status: JobStatus::EnqueueFailed,
                message: "enqueuing liveness check failed".to_owned(),
            };
        }
    }

    if job.status == JobStatus::Running {
        let running_since = job.last_updated_or(JobPhase::Running, now);
        if now - running_since <= cfg.k8s_job_existence_grace_period {
            return Verification::Unchanged;
        }
        if batch.is_none() {
            return Verification::Transition {
                status: JobStatus::UnexpectedError,
                message: "unable to find kubernetes job".to_owned(),
            };
        }
    }

    Verification::Unchanged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use time::macros::datetime;

    fn job(status: JobStatus, last_updated: BTreeMap<JobPhase, OffsetDateTime>) -> JobState {
        JobState {
            key: crate::model::JobKey::new("demo", "job-1"),
            status,
            last_updated,
        }
    }

    #[test_log::test]
    fn missing_queue_within_grace_is_unchanged() {
        let now = datetime!(2026-01-01 00:00:30 UTC);
        let mut lu = BTreeMap::new();
        lu.insert(JobPhase::Enqueuing, datetime!(2026-01-01 00:00:00 UTC));
        let job = job(JobStatus::Enqueuing, lu);
        let result = verify(&job, None, None, &ReconcileConfig::default(), now);
        assert_eq!(result, Verification::Unchanged);
    }

    #[test_log::test]
    fn missing_queue_past_grace_is_unexpected_error() {
        let now = datetime!(2026-01-01 00:00:45 UTC);
        let mut lu = BTreeMap::new();
        lu.insert(JobPhase::Enqueuing, datetime!(2026-01-01 00:00:00 UTC));
        let job = job(JobStatus::Running, lu);
        let result = verify(&job, None, None, &ReconcileConfig::default(), now);
        match result {
            Verification::Transition { status, message } => {
                assert_eq!(status, JobStatus::UnexpectedError);
                assert!(message.contains("was not found"));
            }
            _ => panic!("expected a transition"),
        }
    }

    #[test_log::test]
    fn enqueuing_liveness_failure() {
        let now = datetime!(2026-01-01 00:01:01 UTC);
        let mut lu = BTreeMap::new();
        lu.insert(JobPhase::Enqueuing, datetime!(2026-01-01 00:00:00 UTC));
        lu.insert(JobPhase::LivenessFile, datetime!(2026-01-01 00:00:00 UTC));
        let job = job(JobStatus::Enqueuing, lu);
        let result = verify(&job, Some("url"), None, &ReconcileConfig::default(), now);
        assert_eq!(
            result,
            Verification::Transition {
                status: JobStatus::EnqueueFailed,
                message: "enqueuing liveness check failed".to_owned(),
            }
        );
    }

    #[test_log::test]
    fn running_batch_missing_past_grace() {
        let now = datetime!(2026-01-01 00:00:11 UTC);
        let mut lu = BTreeMap::new();
        lu.insert(JobPhase::Running, datetime!(2026-01-01 00:00:00 UTC));
        let job = job(JobStatus::Running, lu);
        let result = verify(&job, Some("url"), None, &ReconcileConfig::default(), now);
        assert_eq!(
            result,
            Verification::Transition {
                status: JobStatus::UnexpectedError,
                message: "unable to find kubernetes job".to_owned(),
            }
        );
    }

    #[test_log::test]
    fn running_batch_missing_within_grace_is_unchanged() {
        let now = datetime!(2026-01-01 00:00:05 UTC);
        let mut lu = BTreeMap::new();
        lu.insert(JobPhase::Running, datetime!(2026-01-01 00:00:00 UTC));
        let job = job(JobStatus::Running, lu);
        let result = verify(&job, Some("url"), None, &ReconcileConfig::default(), now);
        assert_eq!(result, Verification::Unchanged);
    }
}
