//! In-memory reference implementations of every collaborator trait. Used by
//! the test suite and by `main.rs`'s demo/dry-run mode; never by a real
//! deployment, which would wire a state-store/queue-service/orchestrator
//! client instead.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::collaborators::{JobSpecStore, LogStream, MetricsBackend, Orchestrator, QueueService, StateStore};
use crate::error::ReconcileError;
use crate::model::{
    BatchMetrics, JobKey, JobPhase, JobSpec, JobState, JobStatus, OrchestratorBatch, PodHandle,
};

/// Naming convention used by the fake queue service: the URL's terminal path
/// component is `{api_name}__{id}`, matching spec.md §6's requirement that
/// `jobKeyFromQueueURL` be total.
pub fn queue_url_for(key: &JobKey) -> String {
    format!("https://queue.example.internal/{}__{}", key.api_name, key.id)
}

fn decode_queue_url(url: &str) -> JobKey {
    let component = url.rsplit('/').next().unwrap_or_default();
    match component.split_once("__") {
        Some((api_name, id)) => JobKey::new(api_name, id),
        None => JobKey::new("", component),
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    jobs: Mutex<HashMap<JobKey, (JobState, bool)>>, // (state, in_progress_marker_present)
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, state: JobState) {
        let key = state.key.clone();
        self.jobs.lock().unwrap().insert(key, (state, true));
    }

    pub fn get(&self, key: &JobKey) -> Option<JobState> {
        self.jobs.lock().unwrap().get(key).map(|(s, _)| s.clone())
    }

    pub fn has_in_progress_marker(&self, key: &JobKey) -> bool {
        self.jobs
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, present)| *present)
            .unwrap_or(false)
    }

    fn set_terminal(
        &self,
        key: &JobKey,
        status: JobStatus,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        let mut jobs = self.jobs.lock().unwrap();
        let (state, _) = jobs
            .get_mut(key)
            .ok_or_else(|| ReconcileError::StateStore(format!("no such job {key}")))?;
        state.status = status;
        state.last_updated.insert(JobPhase::from(status), now);
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn list_in_progress(&self, api_kind: &str) -> Result<Vec<JobKey>, ReconcileError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, (_, present))| *present && key.api_name == api_kind)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get_job_state(&self, key: &JobKey) -> Result<JobState, ReconcileError> {
        self.jobs
            .lock()
            .unwrap()
            .get(key)
            .map(|(s, _)| s.clone())
            .ok_or_else(|| ReconcileError::StateStore(format!("no such job {key}")))
    }

    async fn set_succeeded(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError> {
        self.set_terminal(key, JobStatus::Succeeded, now)
    }

    async fn set_completed_with_failures(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        self.set_terminal(key, JobStatus::CompletedWithFailures, now)
    }

    async fn set_timed_out(&self, key: &JobKey, now: OffsetDateTime) -> Result<(), ReconcileError> {
        self.set_terminal(key, JobStatus::TimedOut, now)
    }

    async fn set_enqueue_failed(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        self.set_terminal(key, JobStatus::EnqueueFailed, now)
    }

    async fn set_worker_oom(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        self.set_terminal(key, JobStatus::WorkerOOM, now)
    }

    async fn set_worker_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        self.set_terminal(key, JobStatus::WorkerError, now)
    }

    async fn set_unexpected_error(
        &self,
        key: &JobKey,
        now: OffsetDateTime,
    ) -> Result<(), ReconcileError> {
        self.set_terminal(key, JobStatus::UnexpectedError, now)
    }

    async fn delete_in_progress_marker(&self, key: &JobKey) -> Result<(), ReconcileError> {
        if let Some((_, present)) = self.jobs.lock().unwrap().get_mut(key) {
            *present = false;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQueueService {
    queues: Mutex<HashMap<String, OffsetDateTime>>,
}

impl InMemoryQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, key: &JobKey, created_at: OffsetDateTime) -> String {
        let url = queue_url_for(key);
        self.queues.lock().unwrap().insert(url.clone(), created_at);
        url
    }
}

#[async_trait]
impl QueueService for InMemoryQueueService {
    async fn list_queue_urls(&self) -> Result<Vec<String>, ReconcileError> {
        Ok(self.queues.lock().unwrap().keys().cloned().collect())
    }

    fn job_key_from_queue_url(&self, url: &str) -> JobKey {
        decode_queue_url(url)
    }

    async fn created_at(&self, url: &str) -> Result<OffsetDateTime, ReconcileError> {
        self.queues
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .ok_or_else(|| ReconcileError::Queue(format!("queue {url} not found")))
    }

    async fn delete_queue(&self, url: &str) -> Result<(), ReconcileError> {
        self.queues.lock().unwrap().remove(url);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    batches: Mutex<HashMap<JobKey, OrchestratorBatch>>,
    pods: Mutex<HashMap<String, Vec<PodHandle>>>,
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_batch(&self, batch: OrchestratorBatch) {
        self.batches
            .lock()
            .unwrap()
            .insert(batch.job_key.clone(), batch);
    }

    pub fn set_pods(&self, job_id: &str, pods: Vec<PodHandle>) {
        self.pods.lock().unwrap().insert(job_id.to_owned(), pods);
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn list_batches(&self, api_kind: &str) -> Result<Vec<OrchestratorBatch>, ReconcileError> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.job_key.api_name == api_kind)
            .cloned()
            .collect())
    }

    async fn list_pods_by_job_id(&self, id: &str) -> Result<Vec<PodHandle>, ReconcileError> {
        Ok(self.pods.lock().unwrap().get(id).cloned().unwrap_or_default())
    }

    async fn delete_batch(&self, key: &JobKey) -> Result<(), ReconcileError> {
        self.batches.lock().unwrap().remove(key);
        self.pods.lock().unwrap().remove(&key.id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobSpecStore {
    specs: Mutex<HashMap<JobKey, JobSpec>>,
}

impl InMemoryJobSpecStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: JobKey, spec: JobSpec) {
        self.specs.lock().unwrap().insert(key, spec);
    }
}

#[async_trait]
impl JobSpecStore for InMemoryJobSpecStore {
    async fn download_job_spec(&self, key: &JobKey) -> Result<JobSpec, ReconcileError> {
        self.specs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ReconcileError::JobSpecDownload(format!("no spec for {key}")))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMetricsBackend {
    queue_depth: Mutex<HashMap<String, u64>>,
    batch_metrics: Mutex<HashMap<JobKey, BatchMetrics>>,
}

impl InMemoryMetricsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_queue_depth(&self, url: &str, depth: u64) {
        self.queue_depth.lock().unwrap().insert(url.to_owned(), depth);
    }

    pub fn set_batch_metrics(&self, key: JobKey, metrics: BatchMetrics) {
        self.batch_metrics.lock().unwrap().insert(key, metrics);
    }
}

#[async_trait]
impl MetricsBackend for InMemoryMetricsBackend {
    async fn queue_message_depth(&self, url: &str) -> Result<u64, ReconcileError> {
        Ok(self.queue_depth.lock().unwrap().get(url).copied().unwrap_or(0))
    }

    async fn batch_metrics(&self, key: &JobKey) -> Result<BatchMetrics, ReconcileError> {
        Ok(self
            .batch_metrics
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(BatchMetrics { succeeded: 0 }))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLogStream {
    lines: Mutex<HashMap<JobKey, Vec<String>>>,
}

impl InMemoryLogStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines_for(&self, key: &JobKey) -> Vec<String> {
        self.lines.lock().unwrap().get(key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LogStream for InMemoryLogStream {
    async fn write(&self, key: &JobKey, message: &str) -> Result<(), ReconcileError> {
        self.lines
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push(message.to_owned());
        Ok(())
    }
}
