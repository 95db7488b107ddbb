//! WerkWerk - background job worker host
//!
//! Runs demo workers against an in-memory job store.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use werkwerk_config::{Config, ConfigLoader, ConfigValidator, LogFormat, LoggingSection};

mod cli;
mod cmd_run;

use cli::{Cli, Commands};
use cmd_run::{run_workers, RunOptions};

/// Initialize tracing with console and optional file output.
///
/// `RUST_LOG` takes precedence over `logging.level`. When `logging.dir` is
/// set, logs are also written there with daily rotation.
fn init_tracing(logging: &LoggingSection, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("invalid log level '{}'", logging.level))?;

    let file_layer = match &logging.dir {
        Some(dir) => {
            let dir = ConfigLoader::expand_path(&dir.to_string_lossy());
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create log directory {dir}"))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("werkwerk")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes buffered lines on exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let text_layer = (format == LogFormat::Text).then(|| fmt::layer().with_target(true));
    let json_layer = (format == LogFormat::Json).then(|| fmt::layer().json());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let format = cli
        .log_format
        .map(LogFormat::from)
        .unwrap_or(config.logging.format);
    init_tracing(&config.logging, format)?;

    match cli.command.unwrap_or_default() {
        Commands::Run {
            seed,
            workers,
            fail_every,
            until_idle,
        } => {
            info!("Starting WerkWerk v{}", env!("CARGO_PKG_VERSION"));
            let warnings = ConfigValidator::validate(&config).into_result()?;
            for warning in warnings {
                warn!(field = %warning.path, "{}", warning.message);
            }

            let options = RunOptions {
                seed,
                workers,
                fail_every,
                until_idle,
            };
            run_workers(&config, options).await?;
            Ok(())
        }
        Commands::CheckConfig => check_config(&cli.config, &config),
    }
}

/// Print the effective configuration and any validation findings.
fn check_config(path: &Path, config: &Config) -> anyhow::Result<()> {
    if path.exists() {
        println!("Configuration: {}", path.display());
    } else {
        println!("Configuration: {} (not found, using defaults)", path.display());
    }
    println!("  worker.job_name      = {}", config.worker.job_name);
    println!("  worker.max_retries   = {}", config.worker.max_retries);
    println!("  worker.interval_ms   = {}", config.worker.interval_ms);
    println!("  worker.count         = {}", config.worker.count);
    println!("  store.retry_delay_ms = {}", config.store.retry_delay_ms);
    println!("  logging.level        = {}", config.logging.level);
    println!("  logging.format       = {:?}", config.logging.format);
    match &config.logging.dir {
        Some(dir) => println!("  logging.dir          = {}", dir.display()),
        None => println!("  logging.dir          = (console only)"),
    }

    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        anyhow::bail!("configuration has {} error(s)", result.errors.len());
    }
    println!("Configuration is valid");
    Ok(())
}
