//! Per-execution work context and result.

use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::WorkError;
use crate::job::Job;
use crate::scope::Resolver;

/// Outcome of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    Failure(String),
}

impl WorkResult {
    pub fn success() -> Self {
        WorkResult::Success
    }

    pub fn failure(error: impl Into<String>) -> Self {
        WorkResult::Failure(error.into())
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, WorkResult::Success)
    }

    /// The failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            WorkResult::Success => None,
            WorkResult::Failure(error) => Some(error),
        }
    }
}

/// Everything a unit of work gets for one claimed job.
///
/// Built fresh for every execution and dropped once the outcome has been
/// reported to the store.
pub struct WorkContext<T> {
    job: Arc<Job<T>>,
    span: Span,
    resolver: Arc<Resolver>,
    cancel: CancellationToken,
}

impl<T> WorkContext<T> {
    pub fn from_job(
        job: Arc<Job<T>>,
        span: Span,
        resolver: Arc<Resolver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job,
            span,
            resolver,
            cancel,
        }
    }

    pub fn job(&self) -> &Job<T> {
        &self.job
    }

    /// The job payload.
    pub fn data(&self) -> &T {
        &self.job.data
    }

    /// Span carrying the job's ID and name.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Dependencies scoped to this execution.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Shorthand for `resolver().require::<S>()`.
    pub fn require<S: Any + Send + Sync>(&self) -> Result<Arc<S>, WorkError> {
        self.resolver.require::<S>()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the worker has been asked to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
