//! # WerkWerk Worker
//!
//! Generic background worker that claims jobs from a shared [`JobStore`] and
//! runs them one at a time.
//!
//! ## Features
//!
//! - Fluent [`WorkBuilder`] producing an immutable, validated [`Work`]
//! - Sequential claim → start → execute → complete/fail loop with pacing
//! - Per-iteration dependency scopes released on every exit path
//! - Cooperative cancellation forwarded to the store for the in-flight job
//! - Job logic errors and panics are contained; store failures stop the worker
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use werkwerk_worker::{MemoryJobStore, ServiceProvider, WorkBuilder, WorkResult, Worker};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryJobStore::<String>::new());
//!     store.enqueue("send-email", "alice@example.com".to_string());
//!
//!     let work = WorkBuilder::<String>::new()
//!         .job_name("send-email")
//!         .max_retries(3)
//!         .interval(Duration::from_secs(1))
//!         .work(|ctx| async move {
//!             tracing::info!(to = %ctx.data(), "sending");
//!             Ok(WorkResult::success())
//!         })
//!         .build();
//!
//!     let worker = Worker::new("EmailWorker", work, store, Arc::new(ServiceProvider::new()));
//!     let handle = worker.start();
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     handle.stop().await.unwrap();
//! }
//! ```

pub mod context;
pub mod error;
pub mod handle;
pub mod job;
pub mod scope;
pub mod store;
pub mod watcher;
pub mod work;
pub mod worker;

pub use context::{WorkContext, WorkResult};
pub use error::WorkError;
pub use handle::WorkerHandle;
pub use job::{Job, JobStatus};
pub use scope::{DependencyProvider, DependencyScope, Resolver, ServiceProvider};
pub use store::{JobRecord, JobStore, MemoryJobStore};
pub use tokio_util::sync::CancellationToken;
pub use watcher::CancelWatcher;
pub use work::{Work, WorkBuilder, WorkFn, WorkFuture};
pub use worker::{Worker, WorkerStats};
