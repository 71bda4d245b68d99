//! Core data model (spec.md §3): job identity, lifecycle state, and the
//! shapes of the three external world-views the reconciler joins.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Stable identity of a job. Two jobs with equal `id` are the same job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub api_name: String,
    pub id: String,
}

impl JobKey {
    pub fn new(api_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_name, self.id)
    }
}

/// Job status state machine (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Enqueuing,
    Running,
    Succeeded,
    CompletedWithFailures,
    TimedOut,
    EnqueueFailed,
    WorkerOOM,
    WorkerError,
    UnexpectedError,
}

impl JobStatus {
    /// Mirrors `IsInProgress()` from spec.md §4.2.
    pub fn is_in_progress(self) -> bool {
        matches!(self, JobStatus::Enqueuing | JobStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_in_progress()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Enqueuing => "Enqueuing",
            JobStatus::Running => "Running",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::CompletedWithFailures => "CompletedWithFailures",
            JobStatus::TimedOut => "Timed-Out",
            JobStatus::EnqueueFailed => "EnqueueFailed",
            JobStatus::WorkerOOM => "WorkerOOM",
            JobStatus::WorkerError => "WorkerError",
            JobStatus::UnexpectedError => "UnexpectedError",
        };
        f.write_str(s)
    }
}

/// Names a status-or-phase entry in `JobState::last_updated`. Distinct from
/// `JobStatus` only in carrying the extra `LivenessFile` phase the Enqueuing
/// liveness check watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    Enqueuing,
    Running,
    LivenessFile,
    Succeeded,
    CompletedWithFailures,
    TimedOut,
    EnqueueFailed,
    WorkerOOM,
    WorkerError,
    UnexpectedError,
}

impl From<JobStatus> for JobPhase {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Enqueuing => JobPhase::Enqueuing,
            JobStatus::Running => JobPhase::Running,
            JobStatus::Succeeded => JobPhase::Succeeded,
            JobStatus::CompletedWithFailures => JobPhase::CompletedWithFailures,
            JobStatus::TimedOut => JobPhase::TimedOut,
            JobStatus::EnqueueFailed => JobPhase::EnqueueFailed,
            JobStatus::WorkerOOM => JobPhase::WorkerOOM,
            JobStatus::WorkerError => JobPhase::WorkerError,
            JobStatus::UnexpectedError => JobPhase::UnexpectedError,
        }
    }
}

/// The durable record of a job's lifecycle (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub key: JobKey,
    pub status: JobStatus,
    pub last_updated: BTreeMap<JobPhase, OffsetDateTime>,
}

impl JobState {
    pub fn new(key: JobKey, status: JobStatus) -> Self {
        Self {
            key,
            status,
            last_updated: BTreeMap::new(),
        }
    }

    /// Looks up `last_updated[phase]`, defaulting to `now` when absent. A
    /// missing entry means the phase has never been observed, which should
    /// never itself trigger a grace-period failure — so we treat it as
    /// "just happened" rather than "ancient".
    pub fn last_updated_or(&self, phase: JobPhase, now: OffsetDateTime) -> OffsetDateTime {
        self.last_updated.get(&phase).copied().unwrap_or(now)
    }

    pub fn touch(&mut self, phase: JobPhase, at: OffsetDateTime) {
        self.last_updated.insert(phase, at);
    }
}

/// The immutable user-provided plan for a job (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub workers: u32,
    pub total_batch_count: u64,
    pub timeout: Option<time::Duration>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
}

/// An externally managed work queue (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub job_key: JobKey,
    pub url: String,
    pub created_at: OffsetDateTime,
}

/// Per-container termination detail, modeled on `themelios::resources`
/// (`ContainerStatus` / `ContainerState` / `ContainerStateTerminated`) since
/// the Failure Investigator needs exit codes, reasons, and an OOM test in
/// exactly that shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerStateTerminated {
    pub exit_code: i32,
    pub reason: String,
    pub message: String,
}

impl ContainerStateTerminated {
    pub fn is_oom(&self) -> bool {
        self.reason.eq_ignore_ascii_case("OOMKilled")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerState {
    pub terminated: Option<ContainerStateTerminated>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
    pub last_termination_state: ContainerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A worker pod belonging to an `OrchestratorBatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHandle {
    pub name: String,
    pub phase: PodPhase,
    pub containers: Vec<ContainerStatus>,
}

/// A set of worker pods with labels `{apiKind, apiName, jobID}` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorBatch {
    pub job_key: JobKey,
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// External aggregate work-item counter for a job (spec.md §3). Eventually
/// consistent; lags by seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchMetrics {
    pub succeeded: u64,
}
