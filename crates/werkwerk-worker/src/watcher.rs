//! Forwards worker cancellation to the store for the job in flight.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::job::Job;
use crate::store::JobStore;

type Callback = Arc<dyn Fn() + Send + Sync>;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const DISARMED: u8 = 2;

/// Subscription to a worker's cancellation token for the lifetime of one job.
///
/// If the token fires while the watcher is registered, the callback runs
/// exactly once. After [`CancelWatcher::unregister`] (or drop) it never runs,
/// so a stale watcher cannot touch a later job.
pub struct CancelWatcher {
    cancel: CancellationToken,
    disarm: CancellationToken,
    state: Arc<AtomicU8>,
    callback: Callback,
}

impl CancelWatcher {
    /// Call `store.cancel_sync(job)` if `cancel` fires while registered.
    pub fn register<T: Send + Sync + 'static>(
        cancel: &CancellationToken,
        store: Arc<dyn JobStore<T>>,
        job: Arc<Job<T>>,
    ) -> Self {
        Self::with_callback(cancel, move || {
            debug!(job_id = %job.id, "Cancellation requested, notifying store");
            store.cancel_sync(&job);
        })
    }

    /// Run `callback` if `cancel` fires while registered.
    pub fn with_callback(
        cancel: &CancellationToken,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let watcher = Self {
            cancel: cancel.clone(),
            disarm: CancellationToken::new(),
            state: Arc::new(AtomicU8::new(ARMED)),
            callback: Arc::new(callback),
        };

        let cancel = watcher.cancel.clone();
        let disarm = watcher.disarm.clone();
        let state = watcher.state.clone();
        let callback = watcher.callback.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = disarm.cancelled() => {}
                // Loses to a concurrent unregister through the state swap.
                _ = cancel.cancelled() => fire(&state, &callback),
            }
        });

        watcher
    }

    /// Whether the callback has run.
    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    /// Deliver a cancellation that already happened without waiting for the
    /// background task. The watcher stays registered.
    pub fn flush(&self) -> bool {
        if self.cancel.is_cancelled() {
            fire(&self.state, &self.callback);
        }
        self.has_fired()
    }

    /// Stop watching. Returns whether the callback ran.
    ///
    /// A cancellation that happened while registered but had not been
    /// delivered yet is delivered here before returning.
    pub fn unregister(self) -> bool {
        let fired = self.flush();
        self.disarm_now();
        fired
    }

    fn disarm_now(&self) {
        let _ = self
            .state
            .compare_exchange(ARMED, DISARMED, Ordering::SeqCst, Ordering::SeqCst);
        self.disarm.cancel();
    }
}

impl Drop for CancelWatcher {
    fn drop(&mut self) {
        self.disarm_now();
    }
}

fn fire(state: &AtomicU8, callback: &Callback) {
    if state
        .compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting(cancel: &CancellationToken) -> (CancelWatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let watcher = CancelWatcher::with_callback(cancel, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (watcher, calls)
    }

    #[tokio::test]
    async fn test_fires_once_when_cancelled() {
        let cancel = CancellationToken::new();
        let (watcher, calls) = counting(&cancel);

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(watcher.has_fired());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(watcher.unregister());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregister_delivers_pending_cancel() {
        let cancel = CancellationToken::new();
        let (watcher, calls) = counting(&cancel);

        // No yield between cancel and unregister, so the task has not run yet.
        cancel.cancel();
        assert!(watcher.unregister());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_fire_after_unregister() {
        let cancel = CancellationToken::new();
        let (watcher, calls) = counting(&cancel);

        assert!(!watcher.unregister());
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_disarms() {
        let cancel = CancellationToken::new();
        let (watcher, calls) = counting(&cancel);

        drop(watcher);
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_delivers_and_stays_registered() {
        let cancel = CancellationToken::new();
        let (watcher, calls) = counting(&cancel);

        assert!(!watcher.flush());
        cancel.cancel();
        assert!(watcher.flush());
        assert!(watcher.flush());
        assert!(watcher.unregister());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unregister_race_never_fires_late() {
        for _ in 0..200 {
            let cancel = CancellationToken::new();
            let (watcher, calls) = counting(&cancel);
            tokio::task::yield_now().await;

            let fired = watcher.unregister();
            cancel.cancel();
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert!(!fired);
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_register_calls_store_cancel() {
        use crate::store::MemoryJobStore;
        use crate::JobStatus;

        let store = Arc::new(MemoryJobStore::new());
        let id = store.enqueue("email", "a".to_string());
        let job = store
            .claim_next("email", 3, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        let cancel = CancellationToken::new();
        let dyn_store: Arc<dyn JobStore<String>> = store.clone();
        let watcher = CancelWatcher::register(&cancel, dyn_store, Arc::new(job));
        cancel.cancel();
        assert!(watcher.unregister());
        assert_eq!(store.get(id).unwrap().status, JobStatus::Cancelled);
    }
}
