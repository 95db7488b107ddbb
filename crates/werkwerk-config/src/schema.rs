//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Job name the workers claim.
    #[serde(default = "default_job_name")]
    pub job_name: String,

    /// Retry ceiling passed to the store on every claim.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum gap between iterations, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Number of worker instances the host runs.
    #[serde(default = "default_count")]
    pub count: u32,
}

impl WorkerSection {
    /// Polling interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            job_name: default_job_name(),
            max_retries: default_max_retries(),
            interval_ms: default_interval_ms(),
            count: default_count(),
        }
    }
}

fn default_job_name() -> String {
    "demo".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_count() -> u32 {
    1
}

/// In-memory store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Base backoff before a failed job becomes claimable again, multiplied
    /// by the job's retry count.
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl StoreSection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            dir: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
