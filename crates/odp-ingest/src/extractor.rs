//! The extractor contract
//!
//! An extractor is a standalone executable that fetches one or more
//! datasets, reshapes them, and publishes them through the gateway. The
//! runner learns what happened from three things only: the exit status, the
//! `New data detected` line on stdout, and the status file
//! `new_data_status_<task>.log` in the log folder.
//!
//! Binaries implement [`Extractor`] and hand it to [`run_extractor`], which
//! loads settings, wires the remote store, and takes care of the rest.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use odp_common::config::MailSettings;
use odp_common::logging::{init_logging, LogConfig};
use odp_common::types::{MULTIPLE_FILES, NEW_DATA_TOKEN};
use odp_common::{Settings, StatusLine, Table, Verdict};
use tracing::{error, info, warn};

use crate::error::{IngestError, Result};
use crate::fetch::{FetchRequest, FetchResult, Fetcher};
use crate::mail::{error_report, MailClient};
use crate::publish::{PublishRequest, PublishVerdict, Publisher};
use crate::store::GitHubStore;

/// Set by the runner; overrides [`Extractor::task_name`]
pub const TASK_NAME_ENV: &str = "ODP_TASK_NAME";

/// Artifact field of the status line when nothing was published
pub const NO_ARTIFACT: &str = "none";

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Task name used when the runner does not provide one
    fn task_name(&self) -> &str;

    /// Fetch, reshape, and publish through `ctx`
    async fn run(&self, ctx: &mut ExtractorContext) -> Result<()>;
}

/// Outcome of one published (or skipped) artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactVerdict {
    pub artifact_name: String,
    pub verdict: PublishVerdict,
}

/// What an extractor body works with
pub struct ExtractorContext {
    fetcher: Fetcher,
    publisher: Publisher,
    artifacts: Vec<ArtifactVerdict>,
}

impl ExtractorContext {
    pub fn new(fetcher: Fetcher, publisher: Publisher) -> Self {
        Self {
            fetcher,
            publisher,
            artifacts: Vec::new(),
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub async fn fetch_table(&self, request: &FetchRequest) -> FetchResult<Table> {
        self.fetcher.fetch_table(request).await
    }

    /// Publish one artifact and remember its verdict
    pub async fn publish(&mut self, table: &Table, request: &PublishRequest) -> Result<PublishVerdict> {
        let verdict = self.publisher.publish(table, request).await?;
        self.artifacts.push(ArtifactVerdict {
            artifact_name: request.artifact_name.clone(),
            verdict,
        });
        Ok(verdict)
    }

    /// Count an artifact as unchanged without touching the store, e.g. when
    /// the source had no rows this time
    pub fn record_unchanged(&mut self, artifact_name: impl Into<String>) {
        self.artifacts.push(ArtifactVerdict {
            artifact_name: artifact_name.into(),
            verdict: PublishVerdict::NoChange,
        });
    }

    pub fn artifacts(&self) -> &[ArtifactVerdict] {
        &self.artifacts
    }

    fn into_report(self, task_name: &str) -> ExtractorReport {
        ExtractorReport {
            task_name: task_name.to_string(),
            artifacts: self.artifacts,
        }
    }
}

/// Aggregate result of one extractor run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorReport {
    pub task_name: String,
    pub artifacts: Vec<ArtifactVerdict>,
}

impl ExtractorReport {
    /// New data if any artifact was new or changed
    pub fn verdict(&self) -> Verdict {
        if self.artifacts.iter().any(|a| a.verdict.is_new_data()) {
            Verdict::NewData
        } else {
            Verdict::NoChange
        }
    }

    pub fn status_line(&self) -> StatusLine {
        let artifact = match self.artifacts.as_slice() {
            [] => NO_ARTIFACT,
            [only] => only.artifact_name.as_str(),
            _ => MULTIPLE_FILES,
        };
        StatusLine::new(&self.task_name, artifact, self.verdict().is_new_data())
    }

    /// Write `new_data_status_<task>.log` into `log_folder`
    pub fn write_status_file(&self, log_folder: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(log_folder)?;
        let path = log_folder.join(StatusLine::file_name(&self.task_name));
        std::fs::write(&path, self.status_line().to_line())?;
        Ok(path)
    }
}

/// Run an extractor body with a prepared context and write its status file
pub async fn execute<E: Extractor + ?Sized>(
    extractor: &E,
    task_name: &str,
    mut ctx: ExtractorContext,
    log_folder: &Path,
) -> Result<ExtractorReport> {
    info!(task = %task_name, "Extractor started");
    extractor.run(&mut ctx).await?;

    let report = ctx.into_report(task_name);
    let status_file = report.write_status_file(log_folder)?;
    info!(
        task = %task_name,
        verdict = ?report.verdict(),
        artifacts = report.artifacts.len(),
        status_file = %status_file.display(),
        "Extractor finished"
    );
    Ok(report)
}

fn announce_new_data() {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{NEW_DATA_TOKEN}");
    let _ = stdout.flush();
}

async fn notify_failure(mail: &MailSettings, task_name: &str, err: &IngestError) {
    let recipients: Vec<String> = mail.recipients.iter().map(|r| r.address.clone()).collect();
    let message = error_report(task_name, &mail.sender, &recipients, &[err.to_string()]);
    if let Err(e) = MailClient::new(mail).send(&message).await {
        warn!(error = %e, "Could not send error notification");
    }
}

/// Entry point for extractor binaries
///
/// ```no_run
/// # use odp_ingest::extractor::{run_extractor, Extractor, ExtractorContext};
/// # struct Bosatt;
/// # #[async_trait::async_trait]
/// # impl Extractor for Bosatt {
/// #     fn task_name(&self) -> &str { "Innvandrere - Bosatt" }
/// #     async fn run(&self, _ctx: &mut ExtractorContext) -> odp_ingest::Result<()> { Ok(()) }
/// # }
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     run_extractor(Bosatt).await
/// }
/// ```
pub async fn run_extractor<E: Extractor>(extractor: E) -> ExitCode {
    let log_config = LogConfig::extractor().merge_env().unwrap_or_else(|_| LogConfig::extractor());
    let _guard = init_logging(&log_config).ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Configuration incomplete");
            return ExitCode::FAILURE;
        },
    };

    let task_name = std::env::var(TASK_NAME_ENV)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| extractor.task_name().to_string());

    let store = match GitHubStore::new(&settings.remote) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Remote store unavailable");
            return ExitCode::FAILURE;
        },
    };
    let ctx = ExtractorContext::new(
        Fetcher::new(),
        Publisher::new(Arc::new(store), &settings.temp_folder),
    );

    match execute(&extractor, &task_name, ctx, &settings.log_folder).await {
        Ok(report) => {
            if report.verdict().is_new_data() {
                announce_new_data();
            }
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(task = %task_name, error = %e, "Extractor failed");
            if let Some(mail) = &settings.mail {
                notify_failure(mail, &task_name, &e).await;
            }
            ExitCode::FAILURE
        },
    }
}
