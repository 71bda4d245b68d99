//! Garbage Collector (spec.md §4.5), embedded as steps 4 and 5 of the
//! driver's per-pass algorithm. Disposal deletes the orchestrator batch (if
//! any) and the queue (if any) for a `JobKey`; both are idempotent, so
//! "not found" from either collaborator is treated as success rather than
//! an error when the collaborator implementation reports it that way.

use crate::collaborators::{Orchestrator, QueueService};
use crate::error::{self, ReconcileError};
use crate::model::JobKey;

/// Deletes the batch and the queue for `job_key`, attempting both even if
/// the first fails, and returning the first error encountered (spec.md §7,
/// §9: "first error wins, all effects attempted").
pub async fn dispose(
    job_key: &JobKey,
    queue_url: Option<&str>,
    orchestrator: &(impl Orchestrator + ?Sized),
    queue_service: &(impl QueueService + ?Sized),
) -> Result<(), ReconcileError> {
    let batch_result = orchestrator.delete_batch(job_key).await;
    let queue_result = match queue_url {
        Some(url) => queue_service.delete_queue(url).await,
        None => Ok(()),
    };
    error::first_error([batch_result, queue_result])
}
