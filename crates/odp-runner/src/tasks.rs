//! The ordered extractor list
//!
//! The built-in list is compiled in; a TOML file can replace it:
//!
//! ```toml
//! [[task]]
//! extractor = "bin/innvandrere_bosatt"
//! name = "Innvandrere - Bosatt"
//! ```
//!
//! Relative extractor paths resolve against the base directory.

use std::path::{Path, PathBuf};

use odp_common::types::task_name_safe;
use serde::Deserialize;

use crate::error::{Result, RunnerError};
use crate::master_log::{EMAIL_LOG_NAME, MASTER_LOG_NAME};

/// Prefix of the per-task status files in the log folder
const STATUS_FILE_PREFIX: &str = "new_data_status_";

/// Built-in tasks, in run order: `(extractor path, task name)`
pub const DEFAULT_TASKS: &[(&str, &str)] = &[
    ("bin/innvandrere_bosatt", "Innvandrere - Bosatt"),
    ("bin/innvandringsgrunn", "Innvandrere - Innvandringsgrunn"),
];

/// One configured extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub extractor: PathBuf,
    pub name: String,
}

impl Task {
    /// Task names end up in CSV lines and file names, so `,`, path
    /// separators and names of the run's own log files are rejected.
    pub fn new(extractor: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RunnerError::tasks("task name is empty"));
        }
        if name.contains(',') {
            return Err(RunnerError::tasks(format!("task name '{name}' contains ','")));
        }
        if name.contains(['/', '\\']) {
            return Err(RunnerError::tasks(format!(
                "task name '{name}' contains a path separator"
            )));
        }
        if is_reserved(&name) {
            return Err(RunnerError::tasks(format!(
                "task name '{name}' would overwrite a run log file"
            )));
        }
        Ok(Self {
            extractor: extractor.into(),
            name,
        })
    }

    /// File name of the extractor, as written to the master log
    pub fn script_name(&self) -> String {
        self.extractor
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.extractor.display().to_string())
    }
}

/// `<name>.log` must not land on the master log, the email log or a status file
fn is_reserved(name: &str) -> bool {
    let log_file = format!("{name}.log");
    log_file == MASTER_LOG_NAME || log_file == EMAIL_LOG_NAME || name.starts_with(STATUS_FILE_PREFIX)
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    #[serde(default, rename = "task")]
    tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    extractor: PathBuf,
    name: String,
}

fn resolve(base_dir: &Path, extractor: &Path) -> PathBuf {
    if extractor.is_absolute() {
        extractor.to_path_buf()
    } else {
        base_dir.join(extractor)
    }
}

/// The built-in list resolved against `base_dir`
pub fn default_tasks(base_dir: &Path) -> Result<Vec<Task>> {
    DEFAULT_TASKS
        .iter()
        .map(|(extractor, name)| Task::new(resolve(base_dir, Path::new(extractor)), *name))
        .collect()
}

/// Parse a task list from TOML text
pub fn parse_tasks(text: &str, base_dir: &Path) -> Result<Vec<Task>> {
    let file: TaskFile = toml::from_str(text)?;
    if file.tasks.is_empty() {
        return Err(RunnerError::tasks("no [[task]] entries"));
    }

    let mut tasks: Vec<Task> = Vec::with_capacity(file.tasks.len());
    for entry in file.tasks {
        let safe = task_name_safe(&entry.name);
        if let Some(other) = tasks.iter().find(|t| task_name_safe(&t.name) == safe) {
            return Err(RunnerError::tasks(format!(
                "task names '{}' and '{}' share the status file of '{safe}'",
                other.name, entry.name
            )));
        }
        tasks.push(Task::new(resolve(base_dir, &entry.extractor), entry.name)?);
    }
    Ok(tasks)
}

pub fn load_tasks(path: &Path, base_dir: &Path) -> Result<Vec<Task>> {
    let text = std::fs::read_to_string(path)?;
    parse_tasks(&text, base_dir)
}
