//! Error taxonomy (spec.md §7) and the "first error wins, all effects
//! attempted" aggregation helper called for in §7/§9: idempotent cleanup
//! requires that a failure to delete the queue never prevents attempting to
//! delete the batch, so callers gather every outcome before deciding what
//! (if anything) to propagate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("state store error: {0}")]
    StateStore(String),

    #[error("queue service error: {0}")]
    Queue(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("job spec download error: {0}")]
    JobSpecDownload(String),

    #[error("metrics backend error: {0}")]
    Metrics(String),

    #[error("log stream error: {0}")]
    LogStream(String),

    #[error("external call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Returns the first error among `results`, having let every one of them run
/// to completion already (the caller is responsible for invoking every
/// thunk before collecting here — this only picks the winner).
pub fn first_error(
    results: impl IntoIterator<Item = Result<(), ReconcileError>>,
) -> Result<(), ReconcileError> {
    let mut first = None;
    for result in results {
        if let Err(err) = result {
            if first.is_none() {
                first = Some(err);
            }
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
