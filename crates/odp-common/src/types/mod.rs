//! Run records shared by extractors and the runner

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OdpError, Result};

/// Stdout line an extractor prints when at least one artifact changed
pub const NEW_DATA_TOKEN: &str = "New data detected";

/// Artifact field used when a task published more than one artifact
pub const MULTIPLE_FILES: &str = "multiple_files";

/// Whether a task produced new data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NewData,
    NoChange,
    /// The task failed, so there is nothing to say about its data
    NotApplicable,
}

impl Verdict {
    pub fn is_new_data(self) -> bool {
        self == Verdict::NewData
    }

    /// Log-file rendering: only new data is a "Yes"
    pub fn yes_no(self) -> &'static str {
        if self.is_new_data() {
            "Yes"
        } else {
            "No"
        }
    }
}

/// How a task's process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Completed,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "Completed",
            Outcome::Failed => "Failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = OdpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Completed" => Ok(Outcome::Completed),
            "Failed" => Ok(Outcome::Failed),
            other => Err(OdpError::Parse(format!("unknown outcome '{other}'"))),
        }
    }
}

/// One task's result within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_name: String,
    /// File name of the extractor executable
    pub script: String,
    /// Artifact reported by the extractor's status file, if any
    pub artifact_name: Option<String>,
    pub verdict: Verdict,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub outcome: Outcome,
}

/// Task name with dots and spaces replaced, safe for file names
pub fn task_name_safe(task_name: &str) -> String {
    task_name.replace(['.', ' '], "_")
}

/// The single line an extractor leaves in `new_data_status_<task>.log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub task_name_safe: String,
    pub artifact: String,
    pub new_data: bool,
}

impl StatusLine {
    pub fn new(task_name: &str, artifact: impl Into<String>, new_data: bool) -> Self {
        Self {
            task_name_safe: task_name_safe(task_name),
            artifact: artifact.into(),
            new_data,
        }
    }

    /// Status file name for a task
    pub fn file_name(task_name: &str) -> String {
        format!("new_data_status_{}.log", task_name_safe(task_name))
    }

    pub fn to_line(&self) -> String {
        format!(
            "{},{},{}\n",
            self.task_name_safe,
            self.artifact,
            if self.new_data { "Yes" } else { "No" }
        )
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.trim().splitn(3, ',');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(task), Some(artifact), Some(flag)) if !task.is_empty() => Ok(Self {
                task_name_safe: task.to_string(),
                artifact: artifact.to_string(),
                new_data: flag.trim().eq_ignore_ascii_case("yes"),
            }),
            _ => Err(OdpError::Parse(format!("malformed status line '{}'", line.trim()))),
        }
    }
}
