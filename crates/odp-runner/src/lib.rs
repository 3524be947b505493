//! ODP Runner Library
//!
//! Runs the configured extractors one after another, keeps the master run
//! log, and mails the morning summary.
//!
//! - **Nightly run**: every task in order, under a run lock (`odp-runner run`)
//! - **Summary**: re-send the summary for the last run (`odp-runner notify`)
//! - **Remote scan**: list published files in a remote folder (`odp-runner scan`)
//! - **Task list**: show what a run would execute (`odp-runner tasks`)

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod error;
pub mod lock;
pub mod master_log;
pub mod orchestrator;
pub mod summary;
pub mod tasks;

// Re-export commonly used types
pub use error::{Result, RunnerError};
pub use orchestrator::{Orchestrator, RunReport};
pub use summary::{MailSummary, SummarySink};
pub use tasks::Task;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Telemark open-data pipeline runner
#[derive(Parser, Debug)]
#[command(name = "odp-runner")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML task list replacing the built-in one
    #[arg(long, env = "ODP_TASKS_FILE", global = true)]
    pub tasks: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every extractor in order and send the summary
    Run {
        /// Skip the summary notification
        #[arg(long)]
        no_notify: bool,

        /// Per-extractor timeout in seconds (overrides ODP_EXTRACTOR_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Send the summary for the last run's master log
    Notify,

    /// List files in a remote folder
    Scan {
        /// Remote folder, e.g. "Data/09_Innvandrere og inkludering"
        folder: String,

        /// Only show file names matching this regular expression
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Show the configured tasks in run order
    Tasks,
}
