//! Job definition and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job status as tracked by a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting to be claimed.
    #[default]
    Pending,
    /// Claimed by a worker, not yet started.
    Claimed,
    /// Currently being processed.
    Running,
    /// Completed successfully.
    Completed,
    /// Failed, may be claimed again while retries remain.
    Failed,
    /// Failed with no retries left.
    DeadLetter,
    /// Execution was abandoned because the worker shut down.
    Cancelled,
}

impl JobStatus {
    /// Whether no further transitions are expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLetter)
    }

    /// Whether a worker currently holds the job.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobStatus::Claimed | JobStatus::Running)
    }
}

/// A job claimed from a store.
///
/// Workers only read jobs; every state change goes through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<T> {
    /// Unique job ID.
    pub id: Uuid,
    /// Job name, matched against the worker's configured name on claim.
    pub name: String,
    /// Number of failed attempts so far.
    pub retries: u32,
    /// Job payload.
    pub data: T,
    /// When the job was claimed.
    pub claimed_at: DateTime<Utc>,
}

impl<T> Job<T> {
    /// Create a job view for a freshly claimed record.
    pub fn new(id: Uuid, name: impl Into<String>, retries: u32, data: T) -> Self {
        Self {
            id,
            name: name.into(),
            retries,
            data,
            claimed_at: Utc::now(),
        }
    }

    /// Whether this claim is a retry of a previously failed attempt.
    pub fn is_retry(&self) -> bool {
        self.retries > 0
    }
}
