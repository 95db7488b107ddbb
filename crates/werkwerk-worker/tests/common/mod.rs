//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use uuid::Uuid;
use werkwerk_worker::{
    CancellationToken, Job, JobStore, MemoryJobStore, ServiceProvider, WorkError,
};

/// A store call as observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Claim { max_retries: u32, found: Option<Uuid> },
    Start(Uuid),
    Complete(Uuid),
    Fail(Uuid, String),
    CancelSync(Uuid),
}

impl Call {
    pub fn is_claim(&self) -> bool {
        matches!(self, Call::Claim { .. })
    }

    pub fn is_report(&self) -> bool {
        matches!(self, Call::Start(_) | Call::Complete(_) | Call::Fail(..))
    }
}

/// [`MemoryJobStore`] that timestamps every call made by the worker.
pub struct RecordingStore {
    inner: MemoryJobStore<String>,
    calls: Mutex<Vec<(Instant, Call)>>,
    fail_start: AtomicBool,
    complete_delay: Mutex<Duration>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryJobStore::new(),
            calls: Mutex::new(Vec::new()),
            fail_start: AtomicBool::new(false),
            complete_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Make every `start` call fail with a store error.
    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Make every `complete` call take `delay` before it is applied.
    pub fn slow_complete(&self, delay: Duration) {
        *self.complete_delay.lock() = delay;
    }

    pub fn enqueue(&self, name: &str, data: &str) -> Uuid {
        self.inner.enqueue(name, data.to_string())
    }

    pub fn inner(&self) -> &MemoryJobStore<String> {
        &self.inner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().clone()
    }

    /// Timestamps of every claim attempt.
    pub fn claim_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, call)| call.is_claim())
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|(_, call)| predicate(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push((Instant::now(), call));
    }
}

#[async_trait]
impl JobStore<String> for RecordingStore {
    async fn claim_next(
        &self,
        job_name: &str,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<Job<String>>, WorkError> {
        let job = self.inner.claim_next(job_name, max_retries, cancel).await?;
        self.record(Call::Claim {
            max_retries,
            found: job.as_ref().map(|j| j.id),
        });
        Ok(job)
    }

    async fn start(&self, job: &Job<String>, cancel: &CancellationToken) -> Result<(), WorkError> {
        self.record(Call::Start(job.id));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(WorkError::Store("database unavailable".to_string()));
        }
        self.inner.start(job, cancel).await
    }

    async fn complete(
        &self,
        job: &Job<String>,
        cancel: &CancellationToken,
    ) -> Result<(), WorkError> {
        self.record(Call::Complete(job.id));
        let delay = *self.complete_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.complete(job, cancel).await
    }

    async fn fail(
        &self,
        job: &Job<String>,
        error: &str,
        cancel: &CancellationToken,
    ) -> Result<(), WorkError> {
        self.record(Call::Fail(job.id, error.to_string()));
        self.inner.fail(job, error, cancel).await
    }

    fn cancel_sync(&self, job: &Job<String>) {
        self.record(Call::CancelSync(job.id));
        self.inner.cancel_sync(job);
    }
}

/// Collects the messages of ERROR level events.
#[derive(Clone, Default)]
pub struct ErrorLogs(Arc<Mutex<Vec<String>>>);

impl ErrorLogs {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.0.lock().iter().filter(|m| m.contains(needle)).count()
    }
}

impl<S: Subscriber> Layer<S> for ErrorLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.0.lock().push(visitor.0);
        }
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// Install an error collector for the current thread.
pub fn capture_errors() -> (ErrorLogs, DefaultGuard) {
    let logs = ErrorLogs::default();
    let guard = tracing_subscriber::registry()
        .with(logs.clone())
        .set_default();
    (logs, guard)
}

/// Provider that counts released scopes.
pub fn counting_provider() -> (ServiceProvider, Arc<AtomicUsize>) {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let provider = ServiceProvider::new().on_release(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (provider, released)
}

/// Assert `actual` is `expected` give or take timer granularity.
pub fn assert_close(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_millis(5);
    assert!(
        actual + tolerance >= expected && actual <= expected + tolerance,
        "expected about {expected:?}, got {actual:?}"
    );
}
