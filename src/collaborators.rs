//! External collaborators (spec.md §6), specified as traits so the
//! reconciliation logic is testable against in-memory fakes (`mem`) and
//! swappable against real backends without recompiling the core.
//!
//! The terminal-status setter family on `StateStore` is deliberate API
//! surface: each setter writes both `status` and `last_updated[status]`
//! atomically, so callers cannot forget the timestamp (spec.md §9).

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::ReconcileError;
use crate::model::{BatchMetrics, JobKey, JobSpec, JobState, OrchestratorBatch, PodHandle};

pub mod mem;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn list_in_progress(&self, api_kind: &str) -> Result<Vec<JobKey>, ReconcileError>;
    async fn get_job_state(&self, key: &JobKey) -> Result<JobState, ReconcileError>;

    async fn set_succeeded(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError>;
    async fn set_completed_with_failures(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError>;
    async fn set_timed_out(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError>;
    async fn set_enqueue_failed(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError>;
    async fn set_worker_oom(&self, key: &JobKey, now: OffsetDateTime)
        -> Result<(), ReconcileError>;
    async fn set_worker_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError>;
    async fn set_unexpected_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError>;

    async fn delete_in_progress_marker(&self, key: &JobKey) -> Result<(), ReconcileError>;
}

#[async_trait]
pub trait QueueService: Send + Sync {
    async fn list_queue_urls(&self) -> Result<Vec<String>, ReconcileError>;

    /// Total: every queue URL this service hands out decodes to a `JobKey`.
    fn job_key_from_queue_url(&self, url: &str) -> JobKey;

    async fn created_at(&self, url: &str) -> Result<OffsetDateTime, ReconcileError>;

    /// Idempotent: deleting an already-gone queue is success, not error.
    async fn delete_queue(&self, url: &str) -> Result<(), ReconcileError>;
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn list_batches(&self, api_kind: &str) -> Result<Vec<OrchestratorBatch>, ReconcileError>;
    async fn list_pods_by_job_id(&self, id: &str) -> Result<Vec<PodHandle>, ReconcileError>;

    /// Idempotent: deleting an already-gone batch is success, not error.
    async fn delete_batch(&self, key: &JobKey) -> Result<(), ReconcileError>;
}

#[async_trait]
pub trait JobSpecStore: Send + Sync {
    async fn download_job_spec(&self, key: &JobKey) -> Result<JobSpec, ReconcileError>;
}

#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn queue_message_depth(&self, url: &str) -> Result<u64, ReconcileError>;
    async fn batch_metrics(&self, key: &JobKey) -> Result<BatchMetrics, ReconcileError>;
}

#[async_trait]
pub trait LogStream: Send + Sync {
    /// Best-effort: errors are folded into the same aggregation as the
    /// surrounding state mutation (spec.md §6).
    async fn write(&self, key: &JobKey, message: &str) -> Result<(), ReconcileError>;
}

// Blanket reference impls let callers (tests, `main.rs`) hold onto a
// collaborator and hand `Reconciler::new` a borrow of it instead of giving up
// ownership, so the fake's state remains inspectable after a pass runs.

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for &T {
    async fn list_in_progress(&self, api_kind: &str) -> Result<Vec<JobKey>, ReconcileError> {
        (**self).list_in_progress(api_kind).await
    }

    async fn get_job_state(&self, key: &JobKey) -> Result<JobState, ReconcileError> {
        (**self).get_job_state(key).await
    }

    async fn set_succeeded(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError> {
        (**self).set_succeeded(key, now).await
    }

    async fn set_completed_with_failures(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        (**self).set_completed_with_failures(key, now).await
    }

    async fn set_timed_out(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError> {
        (**self).set_timed_out(key, now).await
    }

    async fn set_enqueue_failed(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        (**self).set_enqueue_failed(key, now).await
    }

    async fn set_worker_oom(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        (**self).set_worker_oom(key, now).await
    }

    async fn set_worker_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        (**self).set_worker_error(key, now).await
    }

    async fn set_unexpected_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        (**self).set_unexpected_error(key, now).await
    }

    async fn delete_in_progress_marker(&self, key: &JobKey) -> Result<(), ReconcileError> {
        (**self).delete_in_progress_marker(key).await
    }
}

#[async_trait]
impl<T: QueueService + ?Sized> QueueService for &T {
    async fn list_queue_urls(&self) -> Result<Vec<String>, ReconcileError> {
        (**self).list_queue_urls().await
    }

    fn job_key_from_queue_url(&self, url: &str) -> JobKey {
        (**self).job_key_from_queue_url(url)
    }

    async fn created_at(&self, url: &str) -> Result<OffsetDateTime, ReconcileError> {
        (**self).created_at(url).await
    }

    async fn delete_queue(&self, url: &str) -> Result<(), ReconcileError> {
        (**self).delete_queue(url).await
    }
}

#[async_trait]
impl<T: Orchestrator + ?Sized> Orchestrator for &T {
    async fn list_batches(&self, api_kind: &str) -> Result<Vec<OrchestratorBatch>, ReconcileError> {
        (**self).list_batches(api_kind).await
    }

    async fn list_pods_by_job_id(&self, id: &str) -> Result<Vec<PodHandle>, ReconcileError> {
        (**self).list_pods_by_job_id(id).await
    }

    async fn delete_batch(&self, key: &JobKey) -> Result<(), ReconcileError> {
        (**self).delete_batch(key).await
    }
}

#[async_trait]
impl<T: JobSpecStore + ?Sized> JobSpecStore for &T {
    async fn download_job_spec(&self, key: &JobKey) -> Result<JobSpec, ReconcileError> {
        (**self).download_job_spec(key).await
    }
}

#[async_trait]
impl<T: MetricsBackend + ?Sized> MetricsBackend for &T {
    async fn queue_message_depth(&self, url: &str) -> Result<u64, ReconcileError> {
        (**self).queue_message_depth(url).await
    }

    async fn batch_metrics(&self, key: &JobKey) -> Result<BatchMetrics, ReconcileError> {
        (**self).batch_metrics(key).await
    }
}

#[async_trait]
impl<T: LogStream + ?Sized> LogStream for &T {
    async fn write(&self, key: &JobKey, message: &str) -> Result<(), ReconcileError> {
        (**self).write(key, message).await
    }
}
