//! Command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod notify;
pub mod run;
pub mod scan;
pub mod tasks;

use std::path::Path;

use crate::error::Result;
use crate::tasks::{default_tasks, load_tasks, Task};

/// The task file if one was given, else the built-in list
pub fn resolve_tasks(tasks_file: Option<&Path>, base_dir: &Path) -> Result<Vec<Task>> {
    match tasks_file {
        Some(path) => load_tasks(path, base_dir),
        None => default_tasks(base_dir),
    }
}
