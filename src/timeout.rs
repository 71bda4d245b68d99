//! Per-call timeout bound (spec.md §5: "an outer timeout of ~ReconcilePeriod
//! / 2 per external call is recommended to prevent pass starvation").
//!
//! Implemented as a transparent decorator around a collaborator rather than
//! duplicated at every call site in `reconciler.rs`/`classifier.rs`/`gc.rs` —
//! wrapping once here means every caller gets the same bound for free, and a
//! collaborator that is already fast (the in-memory fakes) pays nothing extra
//! beyond the `tokio::time::timeout` future's own bookkeeping.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::collaborators::{
    JobSpecStore, LogStream, MetricsBackend, Orchestrator, QueueService, StateStore,
};
use crate::error::ReconcileError;
use crate::model::{BatchMetrics, JobKey, JobSpec, JobState, OrchestratorBatch, PodHandle};

pub struct TimeoutGuard<T> {
    inner: T,
    budget: StdDuration,
}

impl<T> TimeoutGuard<T> {
    pub fn new(inner: T, budget: StdDuration) -> Self {
        Self { inner, budget }
    }
}

async fn bound<T>(
    budget: StdDuration,
    fut: impl std::future::Future<Output = Result<T, ReconcileError>>,
) -> Result<T, ReconcileError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(ReconcileError::Timeout(budget)),
    }
}

#[async_trait]
impl<T: StateStore> StateStore for TimeoutGuard<T> {
    async fn list_in_progress(&self, api_kind: &str) -> Result<Vec<JobKey>, ReconcileError> {
        bound(self.budget, self.inner.list_in_progress(api_kind)).await
    }

    async fn get_job_state(&self, key: &JobKey) -> Result<JobState, ReconcileError> {
        bound(self.budget, self.inner.get_job_state(key)).await
    }

    async fn set_succeeded(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.set_succeeded(key, now)).await
    }

    async fn set_completed_with_failures(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.set_completed_with_failures(key, now)).await
    }

    async fn set_timed_out(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.set_timed_out(key, now)).await
    }

    async fn set_enqueue_failed(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.set_enqueue_failed(key, now)).await
    }

    async fn set_worker_oom(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.set_worker_oom(key, now)).await
    }

    async fn set_worker_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.set_worker_error(key, now)).await
    }

    async fn set_unexpected_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.set_unexpected_error(key, now)).await
    }

    async fn delete_in_progress_marker(&self, key: &JobKey) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.delete_in_progress_marker(key)).await
    }
}

#[async_trait]
impl<T: QueueService> QueueService for TimeoutGuard<T> {
    async fn list_queue_urls(&self) -> Result<Vec<String>, ReconcileError> {
        bound(self.budget, self.inner.list_queue_urls()).await
    }

    fn job_key_from_queue_url(&self, url: &str) -> JobKey {
        // Pure/local decoding, not an external call; nothing to bound.
        self.inner.job_key_from_queue_url(url)
    }

    async fn created_at(&self, url: &str) -> Result<OffsetDateTime, ReconcileError> {
        bound(self.budget, self.inner.created_at(url)).await
    }

    async fn delete_queue(&self, url: &str) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.delete_queue(url)).await
    }
}

#[async_trait]
impl<T: Orchestrator> Orchestrator for TimeoutGuard<T> {
    async fn list_batches(&self, api_kind: &str) -> Result<Vec<OrchestratorBatch>, ReconcileError> {
        bound(self.budget, self.inner.list_batches(api_kind)).await
    }

    async fn list_pods_by_job_id(&self, id: &str) -> Result<Vec<PodHandle>, ReconcileError> {
        bound(self.budget, self.inner.list_pods_by_job_id(id)).await
    }

    async fn delete_batch(&self, key: &JobKey) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.delete_batch(key)).await
    }
}

#[async_trait]
impl<T: JobSpecStore> JobSpecStore for TimeoutGuard<T> {
    async fn download_job_spec(&self, key: &JobKey) -> Result<JobSpec, ReconcileError> {
        bound(self.budget, self.inner.download_job_spec(key)).await
    }
}

#[async_trait]
impl<T: MetricsBackend> MetricsBackend for TimeoutGuard<T> {
    async fn queue_message_depth(&self, url: &str) -> Result<u64, ReconcileError> {
        bound(self.budget, self.inner.queue_message_depth(url)).await
    }

    async fn batch_metrics(&self, key: &JobKey) -> Result<BatchMetrics, ReconcileError> {
        bound(self.budget, self.inner.batch_metrics(key)).await
    }
}

#[async_trait]
impl<T: LogStream> LogStream for TimeoutGuard<T> {
    async fn write(&self, key: &JobKey, message: &str) -> Result<(), ReconcileError> {
        bound(self.budget, self.inner.write(key, message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::model::JobKey;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct SlowStateStore {
        delay: StdDuration,
        calls: AtomicU64,
    }

    #[async_trait]
    impl StateStore for SlowStateStore {
        async fn list_in_progress(&self, _api_kind: &str) -> Result<Vec<JobKey>, ReconcileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![])
        }
        async fn get_job_state(&self, key: &JobKey) -> Result<JobState, ReconcileError> {
            Ok(JobState::new(key.clone(), crate::model::JobStatus::Running))
        }
        async fn set_succeeded(&self, _key: &JobKey, _now: OffsetDateTime) -> Result<(), ReconcileError> {
            Ok(())
        }
        async fn set_completed_with_failures(
            &self,
            _key: &JobKey,
            _now: OffsetDateTime,
        ) -> Result<(), ReconcileError> {
            Ok(())
        }
        async fn set_timed_out(&self, _key: &JobKey, _now: OffsetDateTime) -> Result<(), ReconcileError> {
            Ok(())
        }
        async fn set_enqueue_failed(
            &self,
            _key: &JobKey,
            _now: OffsetDateTime,
        ) -> Result<(), ReconcileError> {
            Ok(())
        }
        async fn set_worker_oom(&self, _key: &JobKey, _now: OffsetDateTime) -> Result<(), ReconcileError> {
            Ok(())
        }
        async fn set_worker_error(
            &self,
            _key: &JobKey,
            _now: OffsetDateTime,
        ) -> Result<(), ReconcileError> {
            Ok(())
        }
        async fn set_unexpected_error(
            &self,
            _key: &JobKey,
            _now: OffsetDateTime,
        ) -> Result<(), ReconcileError> {
            Ok(())
        }
        async fn delete_in_progress_marker(&self, _key: &JobKey) -> Result<(), ReconcileError> {
            Ok(())
        }
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn call_exceeding_budget_times_out() {
        let guard = TimeoutGuard::new(
            SlowStateStore {
                delay: StdDuration::from_secs(60),
                calls: AtomicU64::new(0),
            },
            StdDuration::from_secs(30),
        );
        let result = guard.list_in_progress("demo").await;
        assert!(matches!(result, Err(ReconcileError::Timeout(_))));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn call_within_budget_succeeds() {
        let guard = TimeoutGuard::new(
            SlowStateStore {
                delay: StdDuration::from_secs(5),
                calls: AtomicU64::new(0),
            },
            StdDuration::from_secs(30),
        );
        let result = guard.list_in_progress("demo").await;
        assert_eq!(result.unwrap(), Vec::<JobKey>::new());
    }
}
