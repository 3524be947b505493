//! The master run log
//!
//! ```text
//! [2025-01-13 04:00:00] Master script initialized
//! [13.01.2025 04:00:01] Innvandrere - Bosatt: innvandrere_bosatt: Completed, Yes
//! [13.01.2025 04:02:17] Innvandrere - Innvandringsgrunn: innvandringsgrunn: Failed, No
//! [2025-01-13 04:02:18] Master script completed
//! ```
//!
//! A run with N tasks always leaves N + 2 lines.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use odp_common::{Outcome, TaskRecord};
use tracing::debug;

use crate::error::{Result, RunnerError};

pub const MASTER_LOG_NAME: &str = "00_master_run.log";
pub const EMAIL_LOG_NAME: &str = "00_email.log";
pub const README_NAME: &str = "readme.txt";

/// Header and trailer timestamps
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Task line timestamps
pub const TASK_TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

const INITIALIZED: &str = "Master script initialized";
const COMPLETED: &str = "Master script completed";

/// Append-only handle on `00_master_run.log`
#[derive(Debug)]
pub struct MasterLog {
    path: PathBuf,
}

impl MasterLog {
    /// Truncate the log in `log_folder` and write the header line
    pub fn create(log_folder: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_folder)?;
        let path = log_folder.join(MASTER_LOG_NAME);
        let mut file = File::create(&path)?;
        writeln!(file, "[{}] {INITIALIZED}", Local::now().format(RUN_TIMESTAMP_FORMAT))?;
        file.sync_data()?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(())
    }

    pub fn append_task(&self, record: &TaskRecord) -> Result<()> {
        self.append(&format_task_line(record))
    }

    pub fn append_completed(&self) -> Result<()> {
        self.append(&format!("[{}] {COMPLETED}", Local::now().format(RUN_TIMESTAMP_FORMAT)))
    }
}

/// `[DD.MM.YYYY HH:MM:SS] <task>: <script>: <outcome>, <Yes|No>`
pub fn format_task_line(record: &TaskRecord) -> String {
    format!(
        "[{}] {}: {}: {}, {}",
        record.started_at.format(TASK_TIMESTAMP_FORMAT),
        record.task_name,
        record.script,
        record.outcome,
        record.verdict.yes_no()
    )
}

/// One task line read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterEntry {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub task_name: String,
    pub script: String,
    pub outcome: Outcome,
    pub new_data: bool,
}

/// Parse a task line. Header, trailer, and blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<MasterEntry>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let malformed = || RunnerError::MasterLog(format!("unexpected line '{line}'"));

    let (stamp, rest) = line
        .strip_prefix('[')
        .and_then(|l| l.split_once(']'))
        .ok_or_else(malformed)?;
    let rest = rest.trim();
    if rest == INITIALIZED || rest == COMPLETED {
        return Ok(None);
    }

    let at = NaiveDateTime::parse_from_str(stamp.trim(), TASK_TIMESTAMP_FORMAT).map_err(|_| malformed())?;
    let (head, status) = rest.rsplit_once(": ").ok_or_else(malformed)?;
    let (task_name, script) = head.rsplit_once(": ").ok_or_else(malformed)?;
    let (outcome, flag) = status.split_once(", ").ok_or_else(malformed)?;

    Ok(Some(MasterEntry {
        date: at.date(),
        time: at.time(),
        task_name: task_name.trim().to_string(),
        script: script.trim().to_string(),
        outcome: outcome.parse().map_err(|_| malformed())?,
        new_data: flag.trim().eq_ignore_ascii_case("yes"),
    }))
}

/// All task lines of a master log, in order
pub fn read_entries(path: &Path) -> Result<Vec<MasterEntry>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in text.lines() {
        if let Some(entry) = parse_line(line)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Delete every file in `log_folder` except the retained names.
/// Returns how many files were removed.
pub fn clean_log_folder(log_folder: &Path, retained: &[&str]) -> Result<usize> {
    if !log_folder.exists() {
        std::fs::create_dir_all(log_folder)?;
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(log_folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| retained.contains(&n)) {
            continue;
        }
        std::fs::remove_file(entry.path())?;
        debug!(file = %entry.path().display(), "Removed previous log");
        removed += 1;
    }
    Ok(removed)
}
