//! Handle to a spawned worker.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::WorkError;
use crate::worker::WorkerStats;

/// Handle returned by [`crate::Worker::start`].
///
/// Dropping the handle detaches the worker; it keeps running until its token
/// is cancelled.
pub struct WorkerHandle {
    name: String,
    cancel: CancellationToken,
    stats: Arc<WorkerStats>,
    task: JoinHandle<Result<(), WorkError>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        name: String,
        cancel: CancellationToken,
        stats: Arc<WorkerStats>,
        task: JoinHandle<Result<(), WorkError>>,
    ) -> Self {
        Self {
            name,
            cancel,
            stats,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The token the worker loop observes.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Check if the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request a stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Request a stop and wait for the in-flight job to be reported.
    pub async fn stop(self) -> Result<(), WorkError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the loop to exit on its own.
    pub async fn join(self) -> Result<(), WorkError> {
        self.task.await.map_err(join_error)?
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

fn join_error(err: JoinError) -> WorkError {
    if err.is_panic() {
        let panic = err.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        WorkError::WorkerPanicked(message)
    } else {
        WorkError::Cancelled
    }
}
