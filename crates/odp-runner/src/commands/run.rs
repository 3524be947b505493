//! `odp-runner run`
//!
//! Runs every configured extractor and sends the summary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use odp_common::Settings;
use tracing::warn;

use super::resolve_tasks;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::summary::MailSummary;

pub async fn run(
    settings: &Settings,
    tasks_file: Option<&Path>,
    notify: bool,
    timeout: Option<Duration>,
) -> Result<RunReport> {
    let tasks = resolve_tasks(tasks_file, &settings.base_dir)?;
    let mut orchestrator = Orchestrator::new(tasks, &settings.log_folder, &settings.temp_folder)
        .timeout(timeout.unwrap_or(settings.extractor_timeout));

    if notify {
        match &settings.mail {
            Some(mail) => {
                orchestrator = orchestrator.notifier(Arc::new(MailSummary::new(mail, &settings.log_folder)));
            },
            None => warn!("X_FUNCTIONS_KEY is not set, the summary will not be sent"),
        }
    }

    let report = orchestrator.run().await?;

    for record in &report.records {
        println!(
            "{}: {}, {}",
            record.task_name,
            record.outcome,
            record.verdict.yes_no()
        );
    }
    println!(
        "{} task(s), {} with new data, {} failed. Master log: {}",
        report.records.len(),
        report.new_data(),
        report.failed(),
        report.master_log.display()
    );
    Ok(report)
}
