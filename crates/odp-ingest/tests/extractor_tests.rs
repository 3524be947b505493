//! Integration tests for the extractor contract
//!
//! Drives extractor bodies through [`execute`] with a mock source and the
//! in-memory store, and checks the status file the runner reads afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use odp_common::artifact::CsvOptions;
use odp_common::{StatusLine, Verdict};
use odp_ingest::extractor::{execute, Extractor, ExtractorContext};
use odp_ingest::fetch::{FetchRequest, Fetcher, ResponseKind};
use odp_ingest::publish::{PublishRequest, Publisher};
use odp_ingest::store::MemoryStore;
use odp_ingest::{IngestError, Result};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const FOLDER: &str = "Data/09_Innvandrere og inkludering";

/// Publishes every configured source under its own artifact name
struct CsvMirror {
    sources: Vec<(String, String)>,
}

#[async_trait]
impl Extractor for CsvMirror {
    fn task_name(&self) -> &str {
        "Innvandrere - Bosatt"
    }

    async fn run(&self, ctx: &mut ExtractorContext) -> Result<()> {
        for (url, artifact) in &self.sources {
            let request = FetchRequest::get(url.clone(), ResponseKind::Csv(CsvOptions::default()));
            match ctx.fetch_table(&request).await {
                Ok(table) => {
                    ctx.publish(&table, &PublishRequest::new(artifact.clone(), FOLDER))
                        .await?;
                },
                Err(e) if e.is_empty() => ctx.record_unchanged(artifact.clone()),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

struct Harness {
    server: MockServer,
    store: MemoryStore,
    scratch: TempDir,
    logs: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self {
            server: MockServer::start().await,
            store: MemoryStore::new(),
            scratch: TempDir::new().unwrap(),
            logs: TempDir::new().unwrap(),
        }
    }

    async fn serve(&self, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    fn extractor(&self, sources: &[(&str, &str)]) -> CsvMirror {
        CsvMirror {
            sources: sources
                .iter()
                .map(|(route, artifact)| (format!("{}{route}", self.server.uri()), artifact.to_string()))
                .collect(),
        }
    }

    fn context(&self) -> ExtractorContext {
        ExtractorContext::new(
            Fetcher::new(),
            Publisher::new(Arc::new(self.store.clone()), self.scratch.path()),
        )
    }

    fn status_file(&self, task_name: &str) -> String {
        std::fs::read_to_string(self.logs.path().join(StatusLine::file_name(task_name))).unwrap()
    }
}

#[tokio::test]
async fn test_single_artifact_new_data() {
    let h = Harness::new().await;
    h.serve("/bosatt.csv", 200, "Kommune;Antall\nSkien;4\n").await;

    let extractor = h.extractor(&[("/bosatt.csv", "bosatt.csv")]);
    let report = execute(&extractor, "Innvandrere - Bosatt", h.context(), h.logs.path())
        .await
        .unwrap();

    assert_eq!(report.verdict(), Verdict::NewData);
    assert_eq!(h.status_file("Innvandrere - Bosatt"), "Innvandrere_-_Bosatt,bosatt.csv,Yes\n");
    assert!(h.store.get("Data/09_Innvandrere og inkludering/bosatt.csv").is_some());
}

#[tokio::test]
async fn test_multiple_artifacts_any_new_is_yes() {
    let h = Harness::new().await;
    h.serve("/a.csv", 200, "Kommune;Antall\nSkien;4\n").await;
    h.serve("/b.csv", 200, "Kommune;Antall\nBø;1\n").await;
    h.store.insert("Data/09_Innvandrere og inkludering/a.csv", "Kommune,Antall\nSkien,4\n");

    let extractor = h.extractor(&[("/a.csv", "a.csv"), ("/b.csv", "b.csv")]);
    let report = execute(&extractor, "Innvandrere - Bosatt", h.context(), h.logs.path())
        .await
        .unwrap();

    assert_eq!(report.artifacts.len(), 2);
    assert!(!report.artifacts[0].verdict.is_new_data());
    assert!(report.artifacts[1].verdict.is_new_data());
    assert_eq!(
        h.status_file("Innvandrere - Bosatt"),
        "Innvandrere_-_Bosatt,multiple_files,Yes\n"
    );
    assert_eq!(h.store.commits().len(), 1);
}

#[tokio::test]
async fn test_empty_source_counts_as_no_change() {
    let h = Harness::new().await;
    h.serve("/bosatt.csv", 200, "Kommune;Antall\n").await;

    let extractor = h.extractor(&[("/bosatt.csv", "bosatt.csv")]);
    let report = execute(&extractor, "Bosatt", h.context(), h.logs.path()).await.unwrap();

    assert_eq!(report.verdict(), Verdict::NoChange);
    assert_eq!(h.status_file("Bosatt"), "Bosatt,bosatt.csv,No\n");
    assert!(h.store.commits().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_writes_no_status_file() {
    let h = Harness::new().await;
    h.serve("/bosatt.csv", 500, "boom").await;

    let extractor = h.extractor(&[("/bosatt.csv", "bosatt.csv")]);
    let err = execute(&extractor, "Bosatt", h.context(), h.logs.path())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Fetch(_)));
    assert!(!h.logs.path().join(StatusLine::file_name("Bosatt")).exists());
    assert!(h.store.commits().is_empty());
}
