//! Run subcommand: seeds an in-memory store and drives workers over it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use werkwerk_config::Config;
use werkwerk_worker::{
    CancellationToken, JobStatus, MemoryJobStore, ServiceProvider, Work, WorkBuilder,
    WorkContext, WorkResult, Worker, WorkerHandle,
};

/// Flags of the `run` subcommand.
#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    pub seed: u32,
    pub workers: Option<u32>,
    pub fail_every: Option<u32>,
    pub until_idle: bool,
}

/// Store totals after all workers stopped.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub completed: usize,
    pub dead_letter: usize,
    pub unfinished: usize,
    pub delivered: u64,
}

/// Shared by every worker.
#[derive(Default)]
struct Mailer {
    delivered: AtomicU64,
}

/// Fresh per iteration.
struct Attempt {
    id: Uuid,
}

/// Seed the store, start the workers and stop them on Ctrl+C (or once idle).
pub(crate) async fn run_workers(config: &Config, options: RunOptions) -> anyhow::Result<RunSummary> {
    let store = Arc::new(MemoryJobStore::<Value>::new().with_retry_delay(config.store.retry_delay()));
    for seq in 1..=options.seed {
        store.enqueue(
            config.worker.job_name.as_str(),
            json!({ "seq": seq, "recipient": format!("user{seq}@example.com") }),
        );
    }
    info!(count = options.seed, job_name = %config.worker.job_name, "Seeded demo jobs");

    let mailer = Arc::new(Mailer::default());
    let shutdown = CancellationToken::new();
    let count = options.workers.unwrap_or(config.worker.count).max(1);

    let handles: Vec<WorkerHandle> = (1..=count)
        .map(|n| {
            let provider = ServiceProvider::new()
                .singleton(mailer.clone())
                .scoped(|_| Attempt { id: Uuid::new_v4() });
            let work = demo_work(config, options.fail_every);
            Worker::new(format!("DemoWorker-{n}"), work, store.clone(), Arc::new(provider))
                .start_with_token(shutdown.child_token())
        })
        .collect();
    info!(workers = count, "Workers started");

    wait_for_shutdown(&store, config.worker.interval(), options.until_idle).await?;
    shutdown.cancel();

    let mut failed = None;
    for handle in handles {
        let name = handle.name().to_string();
        if let Err(e) = handle.join().await {
            error!(worker = %name, error = %e, "Worker exited with error");
            failed.get_or_insert(e);
        }
    }
    if let Some(e) = failed {
        return Err(e.into());
    }

    let summary = RunSummary {
        completed: store.count(JobStatus::Completed),
        dead_letter: store.count(JobStatus::DeadLetter),
        unfinished: store.len()
            - store.count(JobStatus::Completed)
            - store.count(JobStatus::DeadLetter),
        delivered: mailer.delivered.load(Ordering::SeqCst),
    };
    info!(
        completed = summary.completed,
        dead_letter = summary.dead_letter,
        unfinished = summary.unfinished,
        delivered = summary.delivered,
        "Run finished"
    );
    Ok(summary)
}

fn demo_work(config: &Config, fail_every: Option<u32>) -> Work<Value> {
    let pause = config.worker.interval() / 4;
    WorkBuilder::new()
        .job_name(config.worker.job_name.clone())
        .max_retries(config.worker.max_retries)
        .interval(config.worker.interval())
        .work(move |ctx: WorkContext<Value>| deliver(ctx, pause, fail_every))
        .build()
}

/// Pretend to send an email. Every `fail_every`th job fails its first attempt.
async fn deliver(
    ctx: WorkContext<Value>,
    pause: Duration,
    fail_every: Option<u32>,
) -> anyhow::Result<WorkResult> {
    let mailer = ctx.require::<Mailer>()?;
    let attempt = ctx.require::<Attempt>()?;
    let seq = ctx.data()["seq"].as_u64().unwrap_or_default();
    let recipient = ctx.data()["recipient"].as_str().unwrap_or("unknown");
    info!(attempt = %attempt.id, recipient, "Delivering");

    tokio::select! {
        _ = ctx.cancelled() => {
            return Ok(WorkResult::failure("delivery interrupted by shutdown"));
        }
        _ = tokio::time::sleep(pause) => {}
    }

    if let Some(k) = fail_every.filter(|k| *k > 0) {
        if seq % u64::from(k) == 0 && !ctx.job().is_retry() {
            return Ok(WorkResult::failure(format!("mailbox for {recipient} is unavailable")));
        }
    }

    mailer.delivered.fetch_add(1, Ordering::SeqCst);
    Ok(WorkResult::success())
}

async fn wait_for_shutdown(
    store: &MemoryJobStore<Value>,
    poll: Duration,
    until_idle: bool,
) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    if !until_idle {
        ctrl_c.await?;
        info!("Received Ctrl+C, stopping workers");
        return Ok(());
    }

    let poll = poll.max(Duration::from_millis(50));
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("Received Ctrl+C, stopping workers");
                return Ok(());
            }
            _ = tokio::time::sleep(poll) => {
                if !store.has_outstanding() {
                    info!("No outstanding jobs, stopping workers");
                    return Ok(());
                }
            }
        }
    }
}
