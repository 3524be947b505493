//! ODP Runner - Main entry point

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use odp_common::logging::{init_logging, LogConfig, LogLevel};
use odp_common::Settings;
use odp_runner::{commands, Cli, Commands};
use tracing::{error, warn};

/// Exit status after Ctrl-C, as a shell would report it
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::runner();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    // Environment takes precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = init_logging(&log_config).ok();

    tokio::select! {
        result = execute_command(&cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "Command failed");
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            },
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, the active extractor was stopped and the master log is partial");
            ExitCode::from(INTERRUPTED)
        },
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Configuration incomplete")?;
    let tasks_file = cli.tasks.as_deref();

    match &cli.command {
        Commands::Run {
            no_notify,
            timeout_secs,
        } => {
            commands::run::run(&settings, tasks_file, !no_notify, timeout_secs.map(Duration::from_secs))
                .await
                .context("Run failed")?;
        },
        Commands::Notify => commands::notify::run(&settings).await.context("Could not send summary")?,
        Commands::Scan { folder, pattern } => commands::scan::run(&settings, folder, pattern.as_deref())
            .await
            .with_context(|| format!("Could not scan '{folder}'"))?,
        Commands::Tasks => commands::tasks::run(tasks_file, &settings.base_dir)?,
    }
    Ok(())
}
