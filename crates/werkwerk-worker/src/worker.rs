//! The worker execution loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument, Span};

use crate::context::{WorkContext, WorkResult};
use crate::error::WorkError;
use crate::handle::WorkerHandle;
use crate::job::Job;
use crate::scope::{DependencyProvider, Resolver};
use crate::store::JobStore;
use crate::watcher::CancelWatcher;
use crate::work::{Work, WorkFn, WorkPlan};

/// Counters updated by a running worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    iterations: AtomicU64,
    jobs_claimed: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl WorkerStats {
    /// Completed loop iterations, including empty claims.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::SeqCst)
    }

    pub fn jobs_claimed(&self) -> u64 {
        self.jobs_claimed.load(Ordering::SeqCst)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::SeqCst)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::SeqCst)
    }
}

/// A single sequential worker.
///
/// Claims at most one job per iteration, runs it, reports the outcome and
/// waits out the remainder of the configured interval before claiming again.
pub struct Worker<T> {
    name: String,
    work: Work<T>,
    store: Arc<dyn JobStore<T>>,
    provider: Arc<dyn DependencyProvider>,
    stats: Arc<WorkerStats>,
}

impl<T: Send + Sync + 'static> Worker<T> {
    /// Create a new worker.
    pub fn new(
        name: impl Into<String>,
        work: Work<T>,
        store: Arc<dyn JobStore<T>>,
        provider: Arc<dyn DependencyProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            work,
            store,
            provider,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Get worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn work(&self) -> &Work<T> {
        &self.work
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Spawn the loop with its own cancellation token.
    pub fn start(self) -> WorkerHandle {
        self.start_with_token(CancellationToken::new())
    }

    /// Spawn the loop; cancelling `cancel` stops it.
    pub fn start_with_token(self, cancel: CancellationToken) -> WorkerHandle {
        let name = self.name.clone();
        let stats = self.stats.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        WorkerHandle::new(name, cancel, stats, task)
    }

    /// Run until `cancel` fires.
    ///
    /// Returns `Ok(())` on shutdown and also when the work is invalid, in
    /// which case nothing is polled. Job store failures end the loop with
    /// `Err`. Failures of the unit of work never do.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WorkError> {
        let span = info_span!("worker", worker = %self.name);
        self.run_loop(&cancel).instrument(span).await
    }

    async fn run_loop(&self, cancel: &CancellationToken) -> Result<(), WorkError> {
        let plan = match self.work.plan() {
            Ok(plan) => plan,
            Err(e) => {
                error!(
                    worker = %self.name,
                    error = %e,
                    "Unable to begin work, worker was not configured with valid work"
                );
                return Ok(());
            }
        };

        info!(
            job_name = %plan.job_name,
            max_retries = plan.max_retries,
            interval_ms = millis(plan.interval),
            "Worker started"
        );

        while !cancel.is_cancelled() {
            let elapsed = match self.iterate(&plan, cancel).await {
                Ok(elapsed) => elapsed,
                Err(e) => {
                    error!(worker = %self.name, error = %e, "Worker stopped after unrecoverable error");
                    return Err(e);
                }
            };
            self.stats.iterations.fetch_add(1, Ordering::SeqCst);

            let remaining = plan.interval.saturating_sub(elapsed);
            if remaining.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(remaining) => {}
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    /// One claim / execute / report pass. Returns the time spent on the job.
    async fn iterate(
        &self,
        plan: &WorkPlan<'_, T>,
        cancel: &CancellationToken,
    ) -> Result<Duration, WorkError> {
        // Dropped at the end of this call on every path, releasing the scope.
        let scope = self.provider.create_scope()?;

        let Some(job) = self
            .store
            .claim_next(plan.job_name, plan.max_retries, cancel)
            .await?
        else {
            return Ok(Duration::ZERO);
        };
        let job = Arc::new(job);
        self.stats.jobs_claimed.fetch_add(1, Ordering::SeqCst);
        info!(job_id = %job.id, job_name = %job.name, retries = job.retries, "Job found");

        let started = Instant::now();
        let watcher = CancelWatcher::register(cancel, self.store.clone(), job.clone());

        let resolver = scope.resolver();
        let span = info_span!("job", job_id = %job.id, job_name = %job.name, retries = job.retries);
        let reported = self
            .execute(plan.work, &job, watcher, resolver, cancel, span.clone())
            .instrument(span)
            .await;

        let elapsed = started.elapsed();
        drop(scope);

        reported?;
        Ok(elapsed)
    }

    async fn execute(
        &self,
        work: &WorkFn<T>,
        job: &Arc<Job<T>>,
        watcher: CancelWatcher,
        resolver: Arc<Resolver>,
        cancel: &CancellationToken,
        span: Span,
    ) -> Result<(), WorkError> {
        let started = Instant::now();
        self.store.start(job, cancel).await?;

        let ctx = WorkContext::from_job(job.clone(), span, resolver, cancel.clone());
        let outcome = AssertUnwindSafe(async move { work(ctx).await })
            .catch_unwind()
            .await;
        // A cancellation seen during the run reaches the store before the report.
        watcher.flush();

        let failure = match outcome {
            Ok(Ok(WorkResult::Success)) => None,
            Ok(Ok(WorkResult::Failure(message))) => {
                error!(job_id = %job.id, error = %message, "Job reported failure");
                Some(message)
            }
            Ok(Err(e)) => {
                error!(job_id = %job.id, error = %e, "Job run failed");
                Some(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(job_id = %job.id, error = %message, "Job run failed with panic");
                Some(format!("panicked: {message}"))
            }
        };

        match failure {
            None => {
                self.store.complete(job, cancel).await?;
                self.stats.jobs_completed.fetch_add(1, Ordering::SeqCst);
                info!(job_id = %job.id, elapsed_ms = millis(started.elapsed()), "Job completed");
            }
            Some(message) => {
                self.store.fail(job, &message, cancel).await?;
                self.stats.jobs_failed.fetch_add(1, Ordering::SeqCst);
                info!(job_id = %job.id, elapsed_ms = millis(started.elapsed()), "Job failed");
            }
        }

        // Registered until the outcome is stored; a store error drops it instead.
        watcher.unregister();
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
