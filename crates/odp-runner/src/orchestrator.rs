//! Sequential extractor runs
//!
//! Each task runs as a child process with its own fresh working directory
//! under the scratch folder. Combined stdout and stderr land in
//! `<log_folder>/<task>.log`; the master log gets one line per task in
//! configured order, whatever the outcome.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use odp_common::types::{task_name_safe, NEW_DATA_TOKEN};
use odp_common::{Outcome, StatusLine, TaskRecord, Verdict};
use odp_ingest::extractor::{NO_ARTIFACT, TASK_NAME_ENV};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::lock::{RunLock, LOCK_FILE_NAME};
use crate::master_log::{clean_log_folder, MasterLog, EMAIL_LOG_NAME, README_NAME, TASK_TIMESTAMP_FORMAT};
use crate::summary::SummarySink;
use crate::tasks::Task;

/// Wall-clock limit per extractor unless configured otherwise
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Why a task counts as failed without a non-zero exit
#[derive(Error, Debug)]
enum TaskFailure {
    #[error("could not open task log: {0}")]
    Log(std::io::Error),

    #[error("failed to start: {0}")]
    Spawn(std::io::Error),

    #[error("lost track of the process: {0}")]
    Wait(std::io::Error),

    #[error("timed out after {0:?} and was terminated")]
    TimedOut(Duration),
}

/// Everything one run produced
#[derive(Debug)]
pub struct RunReport {
    pub records: Vec<TaskRecord>,
    pub master_log: PathBuf,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.outcome == Outcome::Failed).count()
    }

    pub fn new_data(&self) -> usize {
        self.records.iter().filter(|r| r.verdict.is_new_data()).count()
    }
}

pub struct Orchestrator {
    tasks: Vec<Task>,
    log_folder: PathBuf,
    scratch_dir: PathBuf,
    timeout: Duration,
    notifier: Option<Arc<dyn SummarySink>>,
}

impl Orchestrator {
    pub fn new(tasks: Vec<Task>, log_folder: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks,
            log_folder: log_folder.into(),
            scratch_dir: scratch_dir.into(),
            timeout: DEFAULT_TASK_TIMEOUT,
            notifier: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn SummarySink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Run every task in order, notify, and close the master log.
    ///
    /// Dropping the returned future kills the active extractor and releases
    /// the lock; the master log then stays partial.
    #[instrument(skip(self), fields(tasks = self.tasks.len()))]
    pub async fn run(&self) -> Result<RunReport> {
        let _lock = RunLock::acquire(&self.scratch_dir)?;

        let removed = clean_log_folder(&self.log_folder, &[README_NAME, EMAIL_LOG_NAME, LOCK_FILE_NAME])?;
        let master = MasterLog::create(&self.log_folder)?;
        info!(removed, master_log = %master.path().display(), "Run started");

        let mut records = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let record = self.run_task(task).await;
            master.append_task(&record)?;
            records.push(record);
        }

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.dispatch(master.path()).await {
                error!(error = %e, "Summary notification failed");
            }
        }
        master.append_completed()?;

        let report = RunReport {
            records,
            master_log: master.path().to_path_buf(),
        };
        info!(failed = report.failed(), new_data = report.new_data(), "Run completed");
        Ok(report)
    }

    fn task_log_path(&self, task: &Task) -> PathBuf {
        self.log_folder.join(format!("{}.log", task.name))
    }

    /// Fresh working directory for one task
    fn workdir(&self, task: &Task) -> std::io::Result<PathBuf> {
        let dir = self.scratch_dir.join("work").join(task_name_safe(&task.name));
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    #[instrument(skip(self, task), fields(task = %task.name))]
    async fn run_task(&self, task: &Task) -> TaskRecord {
        let started_at = Local::now();
        let log_path = self.task_log_path(task);
        info!(extractor = %task.extractor.display(), "Task started");

        let result = self.spawn_and_wait(task, &log_path).await;
        let outcome = match &result {
            Ok(status) if status.success() => Outcome::Completed,
            Ok(status) => {
                warn!(%status, "Extractor exited with failure");
                note_failure(&log_path, &format!("Script failed with {status}"));
                Outcome::Failed
            },
            Err(failure) => {
                warn!(error = %failure, "Extractor did not complete");
                note_failure(&log_path, &format!("Script {failure}"));
                Outcome::Failed
            },
        };

        let status_line = read_status_line(&self.log_folder, &task.name);
        let verdict = match outcome {
            Outcome::Failed => Verdict::NotApplicable,
            Outcome::Completed
                if output_has_token(&log_path) || status_line.as_ref().is_some_and(|s| s.new_data) =>
            {
                Verdict::NewData
            },
            Outcome::Completed => Verdict::NoChange,
        };

        let record = TaskRecord {
            task_name: task.name.clone(),
            script: task.script_name(),
            artifact_name: status_line
                .map(|s| s.artifact)
                .filter(|artifact| artifact != NO_ARTIFACT),
            verdict,
            started_at,
            ended_at: Local::now(),
            outcome,
        };
        info!(outcome = %record.outcome, new_data = record.verdict.yes_no(), "Task finished");
        record
    }

    async fn spawn_and_wait(&self, task: &Task, log_path: &Path) -> std::result::Result<ExitStatus, TaskFailure> {
        let mut stdout = File::create(log_path).map_err(TaskFailure::Log)?;
        writeln!(
            stdout,
            "[{}] Started {} ({})",
            Local::now().format(TASK_TIMESTAMP_FORMAT),
            task.name,
            task.script_name()
        )
        .map_err(TaskFailure::Log)?;
        let stderr = stdout.try_clone().map_err(TaskFailure::Log)?;
        let workdir = self.workdir(task).map_err(TaskFailure::Spawn)?;

        let mut child = Command::new(&task.extractor)
            .current_dir(&workdir)
            .env(TASK_NAME_ENV, &task.name)
            .env("LOG_FOLDER", &self.log_folder)
            .env("TEMP_FOLDER", &self.scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(TaskFailure::Spawn)?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(waited) => waited.map_err(TaskFailure::Wait),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Could not terminate timed-out extractor");
                }
                Err(TaskFailure::TimedOut(self.timeout))
            },
        };

        if let Err(e) = std::fs::remove_dir_all(&workdir) {
            warn!(error = %e, dir = %workdir.display(), "Could not remove task working directory");
        }
        status
    }
}

fn note_failure(log_path: &Path, message: &str) {
    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .and_then(|mut log| writeln!(log, "[{}] {message}", Local::now().format(TASK_TIMESTAMP_FORMAT)));
    if let Err(e) = appended {
        warn!(error = %e, path = %log_path.display(), "Could not append to task log");
    }
}

fn output_has_token(log_path: &Path) -> bool {
    std::fs::read(log_path)
        .map(|bytes| String::from_utf8_lossy(&bytes).contains(NEW_DATA_TOKEN))
        .unwrap_or(false)
}

fn read_status_line(log_folder: &Path, task_name: &str) -> Option<StatusLine> {
    let path = log_folder.join(StatusLine::file_name(task_name));
    let text = std::fs::read_to_string(&path).ok()?;
    match StatusLine::parse(text.lines().next().unwrap_or_default()) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Ignoring unreadable status file");
            None
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_token_detection() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("A.log");
        std::fs::write(&log, b"fetching\nNew data detected\n").unwrap();
        assert!(output_has_token(&log));

        std::fs::write(&log, b"No new data\n").unwrap();
        assert!(!output_has_token(&log));
        assert!(!output_has_token(&dir.path().join("missing.log")));
    }

    #[test]
    fn test_status_line_is_read_by_task_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("new_data_status_Innvandrere_-_Bosatt.log"),
            "Innvandrere_-_Bosatt,bosatt.csv,Yes\n",
        )
        .unwrap();

        let line = read_status_line(dir.path(), "Innvandrere - Bosatt").unwrap();
        assert!(line.new_data);
        assert_eq!(line.artifact, "bosatt.csv");
        assert!(read_status_line(dir.path(), "Other").is_none());
    }
}
