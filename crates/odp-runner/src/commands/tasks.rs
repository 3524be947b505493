//! `odp-runner tasks`

use std::path::Path;

use odp_common::types::task_name_safe;

use super::resolve_tasks;
use crate::error::Result;

pub fn run(tasks_file: Option<&Path>, base_dir: &Path) -> Result<()> {
    let tasks = resolve_tasks(tasks_file, base_dir)?;
    for (i, task) in tasks.iter().enumerate() {
        let marker = if task.extractor.exists() { "" } else { "  (missing)" };
        println!("{:>3}. {}", i + 1, task.name);
        println!("     extractor:   {}{marker}", task.extractor.display());
        println!("     status file: new_data_status_{}.log", task_name_safe(&task.name));
    }
    Ok(())
}
