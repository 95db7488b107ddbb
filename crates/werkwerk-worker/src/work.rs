//! Work definition and its builder.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::{WorkContext, WorkResult};
use crate::error::WorkError;

/// Future returned by a unit of work.
///
/// `Err` is treated like a thrown error: logged and reported as a failure.
pub type WorkFuture = BoxFuture<'static, anyhow::Result<WorkResult>>;

/// The unit of work executed once per claimed job.
pub type WorkFn<T> = Arc<dyn Fn(WorkContext<T>) -> WorkFuture + Send + Sync>;

/// Immutable description of what a worker does.
///
/// Built by [`WorkBuilder`]. A `Work` that is missing any setting is invalid,
/// and a worker given invalid work logs an error and never polls.
pub struct Work<T> {
    job_name: Option<String>,
    max_retries: Option<u32>,
    interval: Option<Duration>,
    work: Option<WorkFn<T>>,
}

/// Borrowed view of a validated [`Work`].
pub(crate) struct WorkPlan<'a, T> {
    pub job_name: &'a str,
    pub max_retries: u32,
    pub interval: Duration,
    pub work: &'a WorkFn<T>,
}

impl<T> Work<T> {
    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Check that every setting is present.
    pub fn validate(&self) -> Result<(), WorkError> {
        self.plan().map(|_| ())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub(crate) fn plan(&self) -> Result<WorkPlan<'_, T>, WorkError> {
        let job_name = match self.job_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(WorkError::InvalidWork("job name is not set".to_string())),
        };
        let work = self
            .work
            .as_ref()
            .ok_or_else(|| WorkError::InvalidWork("work function is not set".to_string()))?;
        let interval = self
            .interval
            .ok_or_else(|| WorkError::InvalidWork("interval is not set".to_string()))?;
        let max_retries = self
            .max_retries
            .ok_or_else(|| WorkError::InvalidWork("max retries is not set".to_string()))?;

        Ok(WorkPlan {
            job_name,
            max_retries,
            interval,
            work,
        })
    }
}

impl<T> std::fmt::Debug for Work<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Work")
            .field("job_name", &self.job_name)
            .field("max_retries", &self.max_retries)
            .field("interval", &self.interval)
            .field("work", &self.work.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Fluent builder for [`Work`].
pub struct WorkBuilder<T> {
    job_name: Option<String>,
    max_retries: Option<u32>,
    interval: Option<Duration>,
    work: Option<WorkFn<T>>,
}

impl<T: Send + Sync + 'static> WorkBuilder<T> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            job_name: None,
            max_retries: None,
            interval: None,
            work: None,
        }
    }

    /// Set the job name claimed from the store.
    pub fn job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    /// Set the retry ceiling passed to the store on claim.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the minimum gap between iterations.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the unit of work.
    pub fn work<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(WorkContext<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<WorkResult>> + Send + 'static,
    {
        let work: WorkFn<T> = Arc::new(move |ctx: WorkContext<T>| -> WorkFuture { f(ctx).boxed() });
        self.work = Some(work);
        self
    }

    /// Build the work. Never fails; check [`Work::is_valid`] before use.
    pub fn build(self) -> Work<T> {
        Work {
            job_name: self.job_name,
            max_retries: self.max_retries,
            interval: self.interval,
            work: self.work,
        }
    }
}

impl<T: Send + Sync + 'static> Default for WorkBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
