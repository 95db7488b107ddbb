//! Job store contract and the in-memory store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::WorkError;
use crate::job::{Job, JobStatus};

/// Job store used by workers.
///
/// Stores own every job state change and their own transient-fault recovery;
/// workers never retry these calls. Retry limits are enforced here too, the
/// worker only passes its configured ceiling to [`JobStore::claim_next`].
#[async_trait]
pub trait JobStore<T: Send + Sync + 'static>: Send + Sync {
    /// Atomically claim the next eligible job with the given name.
    ///
    /// Returns `Ok(None)` when nothing is available.
    async fn claim_next(
        &self,
        job_name: &str,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<Job<T>>, WorkError>;

    /// Mark a claimed job as running.
    async fn start(&self, job: &Job<T>, cancel: &CancellationToken) -> Result<(), WorkError>;

    /// Mark a job as done.
    async fn complete(&self, job: &Job<T>, cancel: &CancellationToken) -> Result<(), WorkError>;

    /// Mark a job as failed, applying the store's retry policy.
    async fn fail(
        &self,
        job: &Job<T>,
        error: &str,
        cancel: &CancellationToken,
    ) -> Result<(), WorkError>;

    /// Best-effort notification that the job's execution was abandoned.
    ///
    /// Called synchronously from cancellation. Must be a no-op once the job
    /// has reached a terminal state.
    fn cancel_sync(&self, job: &Job<T>);
}

/// A job as held by [`MemoryJobStore`].
#[derive(Debug, Clone)]
pub struct JobRecord<T> {
    pub id: Uuid,
    pub name: String,
    pub data: T,
    pub status: JobStatus,
    pub retries: u32,
    /// Retry ceiling supplied by the worker that last claimed the job.
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    available_at: Option<Instant>,
}

impl<T: Clone> JobRecord<T> {
    fn new(name: String, data: T) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            data,
            status: JobStatus::Pending,
            retries: 0,
            max_retries: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            available_at: None,
        }
    }

    fn is_claimable(&self, max_retries: u32, now: Instant) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::Failed => {
                self.retries <= max_retries && self.available_at.is_none_or(|at| at <= now)
            }
            _ => false,
        }
    }

    fn transition(&mut self, to: JobStatus) {
        debug!(job_id = %self.id, from = ?self.status, to = ?to, "Job status changed");
        self.status = to;
        self.updated_at = Utc::now();
    }

    fn to_job(&self) -> Job<T> {
        Job::new(self.id, self.name.clone(), self.retries, self.data.clone())
    }
}

/// In-memory job store.
///
/// Jobs are claimed oldest first. Failed jobs become claimable again after
/// `retry_delay * retries` while their retry count stays within the ceiling
/// supplied on claim, and move to [`JobStatus::DeadLetter`] once it is
/// exceeded. A cancelled job that is later reported failed goes back to
/// [`JobStatus::Pending`] without consuming a retry.
pub struct MemoryJobStore<T> {
    records: Mutex<Vec<JobRecord<T>>>,
    retry_delay: Duration,
}

impl<T: Clone + Send + Sync + 'static> MemoryJobStore<T> {
    /// Create an empty store with no retry backoff.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            retry_delay: Duration::ZERO,
        }
    }

    /// Set the base backoff applied to failed jobs.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Add a pending job and return its ID.
    pub fn enqueue(&self, name: impl Into<String>, data: T) -> Uuid {
        let record = JobRecord::new(name.into(), data);
        let id = record.id;
        debug!(job_id = %id, job_name = %record.name, "Job enqueued");
        self.records.lock().push(record);
        id
    }

    /// Snapshot a single record.
    pub fn get(&self, id: Uuid) -> Option<JobRecord<T>> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Snapshot all records in enqueue order.
    pub fn records(&self) -> Vec<JobRecord<T>> {
        self.records.lock().clone()
    }

    /// Number of records with the given status.
    pub fn count(&self, status: JobStatus) -> usize {
        self.records.lock().iter().filter(|r| r.status == status).count()
    }

    /// Whether any record could still be claimed now or later.
    pub fn has_outstanding(&self) -> bool {
        self.records.lock().iter().any(|r| {
            matches!(
                r.status,
                JobStatus::Pending | JobStatus::Failed | JobStatus::Cancelled
            ) || r.status.is_in_flight()
        })
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut JobRecord<T>) -> Result<R, WorkError>,
    ) -> Result<R, WorkError> {
        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(WorkError::JobNotFound(id))?;
        f(record)
    }
}

impl<T: Clone + Send + Sync + 'static> Default for MemoryJobStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// When a job failed `retries` times becomes claimable again. Saturates to a
/// far-future instant instead of overflowing.
fn retry_at(retry_delay: Duration, retries: u32) -> Instant {
    let now = Instant::now();
    retry_delay
        .checked_mul(retries)
        .and_then(|delay| now.checked_add(delay))
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn invalid<T>(record: &JobRecord<T>, to: JobStatus) -> WorkError {
    WorkError::InvalidTransition {
        id: record.id,
        from: record.status,
        to,
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> JobStore<T> for MemoryJobStore<T> {
    async fn claim_next(
        &self,
        job_name: &str,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<Job<T>>, WorkError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let now = Instant::now();
        let mut records = self.records.lock();
        let Some(record) = records
            .iter_mut()
            .find(|r| r.name == job_name && r.is_claimable(max_retries, now))
        else {
            return Ok(None);
        };

        record.max_retries = max_retries;
        record.transition(JobStatus::Claimed);
        Ok(Some(record.to_job()))
    }

    async fn start(&self, job: &Job<T>, _cancel: &CancellationToken) -> Result<(), WorkError> {
        self.update(job.id, |record| match record.status {
            JobStatus::Claimed => {
                record.transition(JobStatus::Running);
                Ok(())
            }
            // Cancelled between claim and start; the worker reports the outcome later.
            JobStatus::Cancelled => Ok(()),
            _ => Err(invalid(record, JobStatus::Running)),
        })
    }

    async fn complete(&self, job: &Job<T>, _cancel: &CancellationToken) -> Result<(), WorkError> {
        self.update(job.id, |record| match record.status {
            JobStatus::Running | JobStatus::Cancelled => {
                record.last_error = None;
                record.transition(JobStatus::Completed);
                Ok(())
            }
            _ => Err(invalid(record, JobStatus::Completed)),
        })
    }

    async fn fail(
        &self,
        job: &Job<T>,
        error: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), WorkError> {
        let retry_delay = self.retry_delay;
        self.update(job.id, |record| match record.status {
            JobStatus::Running => {
                record.retries += 1;
                record.last_error = Some(error.to_string());
                if record.retries > record.max_retries {
                    record.transition(JobStatus::DeadLetter);
                } else {
                    record.available_at = Some(retry_at(retry_delay, record.retries));
                    record.transition(JobStatus::Failed);
                }
                Ok(())
            }
            JobStatus::Cancelled => {
                record.last_error = Some(error.to_string());
                record.transition(JobStatus::Pending);
                Ok(())
            }
            _ => Err(invalid(record, JobStatus::Failed)),
        })
    }

    fn cancel_sync(&self, job: &Job<T>) {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.id == job.id) {
            Some(record) if record.status.is_in_flight() => {
                record.transition(JobStatus::Cancelled);
            }
            Some(record) => {
                debug!(job_id = %job.id, status = ?record.status, "Ignoring late cancel");
            }
            None => {
                debug!(job_id = %job.id, "Ignoring cancel for unknown job");
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
