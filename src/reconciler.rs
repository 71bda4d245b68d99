//! Reconciler Driver (spec.md §4.1): the periodic pass that joins the three
//! world-views by job identifier and advances, repairs, or tears down each
//! job to keep them consistent.
//!
//! Process-wide mutable state (`job_spec_cache`, `deferred_delete`) lives as
//! plain fields here rather than behind a lock: spec.md §5 guarantees at
//! most one pass runs at a time, so mutation is confined to the single task
//! driving `run_forever`.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{self, ClassifierOutcome};
use crate::collaborators::{JobSpecStore, LogStream, MetricsBackend, Orchestrator, QueueService, StateStore};
use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::gc;
use crate::model::{JobKey, JobSpec, JobStatus};
use crate::telemetry::ReconcilerTelemetry;
use crate::time_source::Clock;
use crate::verifier::{self, Verification};

/// One queue's decoded identity plus the metadata the driver needs: its URL
/// (for deletion) and its creation time (for grace-period checks).
struct QueueEntry {
    url: String,
    created_at: OffsetDateTime,
}

pub struct Reconciler<S, Q, O, J, M, L, C> {
    state_store: S,
    queue_service: Q,
    orchestrator: O,
    job_spec_store: J,
    metrics: M,
    log_stream: L,
    clock: C,
    config: ReconcileConfig,
    api_kind: String,
    job_spec_cache: HashMap<String, JobSpec>,
    deferred_delete: HashSet<String>,
    pub telemetry: ReconcilerTelemetry,
}

impl<S, Q, O, J, M, L, C> Reconciler<S, Q, O, J, M, L, C>
where
    S: StateStore,
    Q: QueueService,
    O: Orchestrator,
    J: JobSpecStore,
    M: MetricsBackend,
    L: LogStream,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_kind: impl Into<String>,
        state_store: S,
        queue_service: Q,
        orchestrator: O,
        job_spec_store: J,
        metrics: M,
        log_stream: L,
        clock: C,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            state_store,
            queue_service,
            orchestrator,
            job_spec_store,
            metrics,
            log_stream,
            clock,
            config,
            api_kind: api_kind.into(),
            job_spec_cache: HashMap::new(),
            deferred_delete: HashSet::new(),
            telemetry: ReconcilerTelemetry::default(),
        }
    }

    /// Drives `run_once` on `config.reconcile_period`, forever. An
    /// overrunning pass delays the next tick rather than queuing a second
    /// one — no two passes may run concurrently (spec.md §5).
    pub async fn run_forever(mut self) {
        let period = self.config.reconcile_period.unsigned_abs();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                tracing::error!(error = %err, "reconciliation pass failed");
            }
        }
    }

    /// A single best-effort pass over every job in progress for this
    /// reconciler's `api_kind` (spec.md §4.1 steps 1-6). Only collection-level
    /// errors (listing the three world-views) are returned; per-job errors
    /// are logged and do not abort the pass.
    #[instrument(skip(self), fields(api_kind = %self.api_kind))]
    pub async fn run_once(&mut self) -> Result<(), ReconcileError> {
        let now = self.clock.now();

        let in_progress = self.state_store.list_in_progress(&self.api_kind).await?;
        let in_progress_ids: HashSet<String> =
            in_progress.iter().map(|k| k.id.clone()).collect();

        let queues = self.collect_queues().await;
        let batches: HashMap<String, crate::model::OrchestratorBatch> = self
            .orchestrator
            .list_batches(&self.api_kind)
            .await?
            .into_iter()
            .map(|b| (b.job_key.id.clone(), b))
            .collect();

        self.job_spec_cache.retain(|id, _| in_progress_ids.contains(id));

        for key in &in_progress {
            self.handle_job(key, &queues, &batches, now).await;
        }

        for batch in batches.values() {
            if !in_progress_ids.contains(&batch.job_key.id) {
                let queue_url = queues.get(&batch.job_key.id).map(|q| q.url.as_str());
                if let Err(err) =
                    gc::dispose(&batch.job_key, queue_url, &self.orchestrator, &self.queue_service)
                        .await
                {
                    warn!(job = %batch.job_key, error = %err, "failed to delete orphan batch");
                    self.telemetry.record_error("orchestrator");
                } else {
                    self.telemetry.orphan_batches_deleted += 1;
                }
            }
        }

        for (id, entry) in &queues {
            if batches.contains_key(id) || in_progress_ids.contains(id) {
                continue;
            }
            if now - entry.created_at > self.config.queue_exist_grace_period {
                if let Err(err) = self.queue_service.delete_queue(&entry.url).await {
                    warn!(queue = %entry.url, error = %err, "failed to delete orphan queue");
                    self.telemetry.record_error("queue_service");
                } else {
                    self.telemetry.orphan_queues_deleted += 1;
                }
            }
        }

        self.deferred_delete.retain(|id| in_progress_ids.contains(id));
        self.telemetry.passes_run += 1;
        debug!(jobs = in_progress.len(), "reconciliation pass complete");
        Ok(())
    }

    async fn collect_queues(&mut self) -> HashMap<String, QueueEntry> {
        let mut queues = HashMap::new();
        let urls = match self.queue_service.list_queue_urls().await {
            Ok(urls) => urls,
            Err(err) => {
                warn!(error = %err, "failed to list queue urls");
                self.telemetry.record_error("queue_service");
                return queues;
            }
        };
        for url in urls {
            let key = self.queue_service.job_key_from_queue_url(&url);
            if key.api_name != self.api_kind {
                continue;
            }
            match self.queue_service.created_at(&url).await {
                Ok(created_at) => {
                    queues.insert(key.id, QueueEntry { url, created_at });
                }
                Err(err) => {
                    warn!(queue = %url, error = %err, "failed to read queue attributes");
                    self.telemetry.record_error("queue_service");
                }
            }
        }
        queues
    }

    #[instrument(skip(self, queues, batches), fields(job = %key))]
    async fn handle_job(
        &mut self,
        key: &JobKey,
        queues: &HashMap<String, QueueEntry>,
        batches: &HashMap<String, crate::model::OrchestratorBatch>,
        now: OffsetDateTime,
    ) {
        let job_state = match self.state_store.get_job_state(key).await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "failed to load job state, treating as unrecoverable");
                self.telemetry.record_error("state_store");
                let _ = self
                    .log_stream
                    .write(key, &format!("failed to load job state: {err}"))
                    .await;
                self.cleanup_in_progress(key, queues.get(&key.id).map(|q| q.url.as_str()))
                    .await;
                return;
            }
        };

        if job_state.status.is_terminal() {
            // Recovers a crashed prior pass: the status was persisted but
            // cleanup never ran.
            self.cleanup_in_progress(key, queues.get(&key.id).map(|q| q.url.as_str()))
                .await;
            return;
        }

        let queue_entry = queues.get(&key.id);
        let batch = batches.get(&key.id);

        match verifier::verify(
            &job_state,
            queue_entry.map(|q| q.url.as_str()),
            batch,
            &self.config,
            now,
        ) {
            Verification::Transition { status, message } => {
                self.write_log(key, &message).await;
                self.finalize(key, status, now).await;
                return;
            }
            Verification::Unchanged => {}
        }

        let Some(queue_entry) = queue_entry else {
            // Queue listing is eventually consistent; protected by the
            // grace period the verifier just checked.
            return;
        };
        let queue_url = queue_entry.url.clone();

        if !self.job_spec_cache.contains_key(&key.id) {
            match self.job_spec_store.download_job_spec(key).await {
                Ok(spec) => {
                    self.job_spec_cache.insert(key.id.clone(), spec);
                }
                Err(err) => {
                    warn!(error = %err, "failed to download job spec, treating as unrecoverable");
                    self.telemetry.record_error("job_spec_store");
                    let _ = self
                        .log_stream
                        .write(key, &format!("failed to download job spec: {err}"))
                        .await;
                    self.cleanup_in_progress(key, Some(&queue_url)).await;
                    return;
                }
            }
        }
        let spec = self.job_spec_cache.get(&key.id).cloned().expect("just cached");

        if let Some(timeout) = spec.timeout {
            if now - spec.start_time > timeout {
                let message = format!(
                    "job exceeded its {} second timeout",
                    timeout.whole_seconds()
                );
                self.write_log(key, &message).await;
                self.finalize(key, JobStatus::TimedOut, now).await;
                if let Err(err) = gc::dispose(
                    key,
                    Some(&queue_url),
                    &self.orchestrator,
                    &self.queue_service,
                )
                .await
                {
                    warn!(error = %err, "failed to delete runtime resources after timeout");
                    self.telemetry.record_error("gc");
                }
                return;
            }
        }

        if job_state.status == JobStatus::Running {
            if let Some(batch) = batch {
                self.classify_and_finalize(key, batch, &queue_url, &spec, now).await;
            }
        }
    }

    async fn classify_and_finalize(
        &mut self,
        key: &JobKey,
        batch: &crate::model::OrchestratorBatch,
        queue_url: &str,
        spec: &JobSpec,
        now: OffsetDateTime,
    ) {
        let outcome = classifier::classify(
            key,
            batch,
            queue_url,
            spec,
            &mut self.deferred_delete,
            &self.metrics,
            &self.orchestrator,
        )
        .await;

        match outcome {
            Ok(ClassifierOutcome::StillRunning) => {}
            Ok(ClassifierOutcome::Terminal { status, log_lines }) => {
                for line in &log_lines {
                    self.write_log(key, line).await;
                }
                self.finalize(key, status, now).await;
                if let Err(err) = gc::dispose(
                    key,
                    Some(queue_url),
                    &self.orchestrator,
                    &self.queue_service,
                )
                .await
                {
                    warn!(error = %err, "failed to delete runtime resources after classification");
                    self.telemetry.record_error("gc");
                }
            }
            Err(err) => {
                warn!(error = %err, "completion classification failed");
                self.telemetry.record_error("classifier");
            }
        }
    }

    async fn write_log(&mut self, key: &JobKey, message: &str) {
        if let Err(err) = self.log_stream.write(key, message).await {
            warn!(error = %err, "failed to write job log line");
            self.telemetry.record_error("log_stream");
        }
    }

    async fn finalize(&mut self, key: &JobKey, status: JobStatus, now: OffsetDateTime) {
        let result = match status {
            JobStatus::Succeeded => self.state_store.set_succeeded(key, now).await,
            JobStatus::CompletedWithFailures => {
                self.state_store.set_completed_with_failures(key, now).await
            }
            JobStatus::TimedOut => self.state_store.set_timed_out(key, now).await,
            JobStatus::EnqueueFailed => self.state_store.set_enqueue_failed(key, now).await,
            JobStatus::WorkerOOM => self.state_store.set_worker_oom(key, now).await,
            JobStatus::WorkerError => self.state_store.set_worker_error(key, now).await,
            JobStatus::UnexpectedError => self.state_store.set_unexpected_error(key, now).await,
            JobStatus::Enqueuing | JobStatus::Running => {
                unreachable!("verifier/classifier never target a non-terminal status")
            }
        };
        match result {
            Ok(()) => {
                info!(%status, "job transitioned");
                self.telemetry.record_transition(status);
            }
            Err(err) => {
                warn!(error = %err, %status, "failed to persist status transition");
                self.telemetry.record_error("state_store");
            }
        }
    }

    async fn cleanup_in_progress(&mut self, key: &JobKey, queue_url: Option<&str>) {
        if let Err(err) =
            gc::dispose(key, queue_url, &self.orchestrator, &self.queue_service).await
        {
            warn!(error = %err, "failed to delete runtime resources during cleanup");
            self.telemetry.record_error("gc");
        }
        if let Err(err) = self.state_store.delete_in_progress_marker(key).await {
            warn!(error = %err, "failed to delete in-progress marker");
            self.telemetry.record_error("state_store");
        }
    }

    pub fn deferred_delete_ids(&self) -> &HashSet<String> {
        &self.deferred_delete
    }
}
