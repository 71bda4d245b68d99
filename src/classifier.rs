//! Completion Classifier (spec.md §4.3). Decides whether a `Running` job has
//! truly finished by cross-checking queue depth, batch-completion counts,
//! and per-job batch-success metrics, using a two-phase "defer one cycle"
//! protocol to absorb cross-system metric skew.
//!
//! Any disagreement between queue depth, `batch.succeeded`, and the
//! metrics-backend `succeeded` count resolves to `UnexpectedError` rather
//! than a false success (spec.md §4.3 rationale).

use std::collections::HashSet;

use crate::collaborators::{MetricsBackend, Orchestrator};
use crate::error::ReconcileError;
use crate::investigator;
use crate::model::{JobKey, JobSpec, JobStatus, OrchestratorBatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierOutcome {
    StillRunning,
    Terminal {
        status: JobStatus,
        log_lines: Vec<String>,
    },
}

pub async fn classify(
    job_key: &JobKey,
    batch: &OrchestratorBatch,
    queue_url: &str,
    job_spec: &JobSpec,
    deferred_delete: &mut HashSet<String>,
    metrics: &(impl MetricsBackend + ?Sized),
    orchestrator: &(impl Orchestrator + ?Sized),
) -> Result<ClassifierOutcome, ReconcileError> {
    if batch.failed > 0 {
        let pods = orchestrator.list_pods_by_job_id(&job_key.id).await?;
        let investigation = investigator::investigate(&pods);
        return Ok(ClassifierOutcome::Terminal {
            status: investigation.status,
            log_lines: investigation.log_lines,
        });
    }

    let depth = metrics.queue_message_depth(queue_url).await?;

    if depth > 0 {
        if batch.active == 0 {
            if deferred_delete.remove(&job_key.id) {
                return Ok(ClassifierOutcome::Terminal {
                    status: JobStatus::UnexpectedError,
                    log_lines: vec![
                        "cluster state indicates job has completed but metrics indicate that job is still in progress"
                            .to_owned(),
                    ],
                });
            }
            deferred_delete.insert(job_key.id.clone());
        }
        return Ok(ClassifierOutcome::StillRunning);
    }

    // Queue is empty.
    let batch_metrics = metrics.batch_metrics(job_key).await?;

    if batch.succeeded == job_spec.workers {
        if batch_metrics.succeeded == job_spec.total_batch_count {
            deferred_delete.remove(&job_key.id);
            return Ok(ClassifierOutcome::Terminal {
                status: JobStatus::Succeeded,
                log_lines: vec!["job completed successfully".to_owned()],
            });
        }
        if deferred_delete.remove(&job_key.id) {
            return Ok(ClassifierOutcome::Terminal {
                status: JobStatus::CompletedWithFailures,
                log_lines: vec![format!(
                    "job completed with {} of {} work items succeeding",
                    batch_metrics.succeeded, job_spec.total_batch_count
                )],
            });
        }
    } else if deferred_delete.remove(&job_key.id) {
        return Ok(ClassifierOutcome::Terminal {
            status: JobStatus::UnexpectedError,
            log_lines: vec![
                "queue is empty but cluster state still indicates that the job is still in progress"
                    .to_owned(),
            ],
        });
    }

    deferred_delete.insert(job_key.id.clone());
    Ok(ClassifierOutcome::StillRunning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mem::{InMemoryMetricsBackend, InMemoryOrchestrator};
    use crate::model::BatchMetrics;
    use time::macros::datetime;

    fn spec(workers: u32, total: u64) -> JobSpec {
        JobSpec {
            workers,
            total_batch_count: total,
            timeout: None,
            start_time: datetime!(2026-01-01 00:00:00 UTC),
        }
    }

    fn batch(key: &JobKey, active: u32, succeeded: u32, failed: u32) -> OrchestratorBatch {
        OrchestratorBatch {
            job_key: key.clone(),
            active,
            succeeded,
            failed,
        }
    }

    #[test_log::test(tokio::test)]
    async fn full_agreement_succeeds_on_first_pass() {
        // Queue empty, batch and metrics fully agree: no disagreement to
        // absorb, so this commits immediately without a deferred cycle.
        let key = JobKey::new("demo", "job-1");
        let metrics = InMemoryMetricsBackend::new();
        let orchestrator = InMemoryOrchestrator::new();
        metrics.set_queue_depth("q", 0);
        metrics.set_batch_metrics(key.clone(), BatchMetrics { succeeded: 1000 });
        let b = batch(&key, 0, 4, 0);
        let job_spec = spec(4, 1000);
        let mut deferred = HashSet::new();

        let first = classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        assert_eq!(
            first,
            ClassifierOutcome::Terminal {
                status: JobStatus::Succeeded,
                log_lines: vec!["job completed successfully".to_owned()],
            }
        );
        assert!(deferred.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn completed_with_failures_after_two_cycles() {
        let key = JobKey::new("demo", "job-2");
        let metrics = InMemoryMetricsBackend::new();
        let orchestrator = InMemoryOrchestrator::new();
        metrics.set_queue_depth("q", 0);
        metrics.set_batch_metrics(key.clone(), BatchMetrics { succeeded: 995 });
        let b = batch(&key, 0, 4, 0);
        let job_spec = spec(4, 1000);
        let mut deferred = HashSet::new();

        classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        let second = classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        assert_eq!(
            second,
            ClassifierOutcome::Terminal {
                status: JobStatus::CompletedWithFailures,
                log_lines: vec!["job completed with 995 of 1000 work items succeeding".to_owned()],
            }
        );
    }

    #[test_log::test(tokio::test)]
    async fn depth_and_batch_disagreement_resolves_to_unexpected_error() {
        let key = JobKey::new("demo", "job-3");
        let metrics = InMemoryMetricsBackend::new();
        let orchestrator = InMemoryOrchestrator::new();
        metrics.set_queue_depth("q", 5);
        let b = batch(&key, 0, 4, 0);
        let job_spec = spec(4, 1000);
        let mut deferred = HashSet::new();

        classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        let second = classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        assert_eq!(
            second,
            ClassifierOutcome::Terminal {
                status: JobStatus::UnexpectedError,
                log_lines: vec![
                    "cluster state indicates job has completed but metrics indicate that job is still in progress"
                        .to_owned()
                ],
            }
        );
    }

    #[test_log::test(tokio::test)]
    async fn failed_workers_delegate_to_investigator() {
        let key = JobKey::new("demo", "job-4");
        let metrics = InMemoryMetricsBackend::new();
        let orchestrator = InMemoryOrchestrator::new();
        let b = batch(&key, 1, 3, 1);
        let job_spec = spec(4, 1000);
        let mut deferred = HashSet::new();

        let outcome = classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        match outcome {
            ClassifierOutcome::Terminal { status, log_lines } => {
                assert_eq!(status, JobStatus::WorkerError);
                assert_eq!(log_lines, vec!["workers were killed for unknown reason".to_owned()]);
            }
            _ => panic!("expected terminal outcome"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn deferred_delete_bounded_to_two_cycles() {
        // Asserts the bound spec.md §9 calls out explicitly: this path can
        // re-enter at most once before a decision is committed.
        let key = JobKey::new("demo", "job-5");
        let metrics = InMemoryMetricsBackend::new();
        let orchestrator = InMemoryOrchestrator::new();
        metrics.set_queue_depth("q", 0);
        metrics.set_batch_metrics(key.clone(), BatchMetrics { succeeded: 0 });
        let b = batch(&key, 0, 2, 0); // succeeded != workers(4), queue empty
        let job_spec = spec(4, 1000);
        let mut deferred = HashSet::new();

        let first = classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        assert_eq!(first, ClassifierOutcome::StillRunning);
        let second = classify(&key, &b, "q", &job_spec, &mut deferred, &metrics, &orchestrator)
            .await
            .unwrap();
        assert!(matches!(
            second,
            ClassifierOutcome::Terminal {
                status: JobStatus::UnexpectedError,
                ..
            }
        ));
        assert!(deferred.is_empty());
    }
}
