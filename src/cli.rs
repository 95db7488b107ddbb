//! CLI definitions for WerkWerk.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use werkwerk_config::LogFormat;

/// WerkWerk CLI.
#[derive(Parser)]
#[command(name = "werkwerk")]
#[command(about = "Background job worker host")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "WERKWERK_CONFIG",
        default_value = "config/werkwerk.toml",
        global = true
    )]
    pub config: PathBuf,

    /// Log output format (overrides `logging.format`)
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run workers against an in-memory store (default)
    Run {
        /// Number of demo jobs to enqueue before starting
        #[arg(long, default_value_t = 10)]
        seed: u32,

        /// Number of workers (overrides `worker.count`)
        #[arg(long)]
        workers: Option<u32>,

        /// Make every Kth job report a failure
        #[arg(long)]
        fail_every: Option<u32>,

        /// Stop once no job is left to claim
        #[arg(long)]
        until_idle: bool,
    },

    /// Load and validate the configuration, then print a summary
    CheckConfig,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            seed: 10,
            workers: None,
            fail_every: None,
            until_idle: false,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
