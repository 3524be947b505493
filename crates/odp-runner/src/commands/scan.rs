//! `odp-runner scan`
//!
//! Lists files in a remote folder, optionally filtered by a name pattern.

use odp_common::Settings;
use odp_ingest::store::{EntryKind, GitHubStore, RemoteEntry, RemoteStore};
use regex::Regex;

use crate::error::Result;

/// Files directly in `folder` whose names match `pattern`
pub async fn scan(store: &dyn RemoteStore, folder: &str, pattern: Option<&str>) -> Result<Vec<RemoteEntry>> {
    let pattern = pattern.map(Regex::new).transpose()?;
    let entries = store.list(folder).await?;
    Ok(entries
        .into_iter()
        .filter(|entry| entry.kind == EntryKind::File)
        .filter(|entry| pattern.as_ref().map_or(true, |p| p.is_match(&entry.name)))
        .collect())
}

pub async fn run(settings: &Settings, folder: &str, pattern: Option<&str>) -> Result<()> {
    let store = GitHubStore::new(&settings.remote)?;
    let files = scan(&store, folder, pattern).await?;

    if files.is_empty() {
        println!("No matching files in '{folder}'.");
        return Ok(());
    }
    for file in &files {
        println!("{}", file.path);
    }
    println!("{} file(s)", files.len());
    Ok(())
}
