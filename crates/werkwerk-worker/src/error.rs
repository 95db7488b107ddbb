//! Worker errors.

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

/// Worker error types.
#[derive(Debug, Error)]
pub enum WorkError {
    /// The work definition is missing a required setting.
    #[error("Invalid work: {0}")]
    InvalidWork(String),

    /// Job not found in the store.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// The store refused a state change.
    #[error("Job {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// A dependency was requested from a scope that does not provide it.
    #[error("Missing dependency: {0}")]
    MissingDependency(&'static str),

    /// Job store backend error.
    #[error("Store error: {0}")]
    Store(String),

    /// The worker task panicked outside of job execution.
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// The worker task was aborted before it finished.
    #[error("Worker cancelled")]
    Cancelled,
}
