//! GitHub contents API backend
//!
//! Files are addressed by repository path on one branch. The blob SHA is the
//! version handle. Files above the API's inline size limit come back with
//! `encoding: "none"` and are refetched through the raw media type.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use odp_common::config::RemoteSettings;
use odp_common::Secret;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{EntryKind, RemoteEntry, RemoteObject, RemoteStore, StoreError, StoreResult, VersionHandle};

// ============================================================================
// GitHub API Constants
// ============================================================================

pub const DEFAULT_GITHUB_TIMEOUT_SECS: u64 = 60;
const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct GitHubStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: Secret,
}

impl GitHubStore {
    pub fn new(settings: &RemoteSettings) -> StoreResult<Self> {
        let (owner, repo) = settings.repository.split_once('/').ok_or_else(|| {
            StoreError::malformed(&settings.repository, "repository must be owner/name")
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_GITHUB_TIMEOUT_SECS))
            .user_agent(concat!("odp-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::network(&settings.api_base, e.to_string()))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: settings.branch.clone(),
            token: settings.token.clone(),
        })
    }

    /// `{api}/repos/{owner}/{repo}/contents/{path}`, each segment percent-encoded
    fn contents_url(&self, path: &str) -> StoreResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| StoreError::malformed(path, format!("bad API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::malformed(path, "API base cannot hold a path"))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder, accept: &str) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Bearer {}", self.token.expose()))
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn get(&self, path: &str, accept: &str) -> StoreResult<Response> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", &self.branch);
        let response = self
            .authorized(self.client.get(url), accept)
            .send()
            .await
            .map_err(|e| StoreError::network(path, e.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(classify(path, response, false).await)
        }
    }

    async fn read_raw(&self, path: &str) -> StoreResult<Vec<u8>> {
        let response = self.get(path, RAW_MEDIA_TYPE).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::network(path, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && headers
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v.as_bytes() == b"0"))
}

/// Map a non-success response onto the store error vocabulary
async fn classify(path: &str, response: Response, writing: bool) -> StoreError {
    let status = response.status();
    let limited = rate_limited(status, response.headers());
    let detail = response.text().await.unwrap_or_default();
    let path = path.to_string();

    match status {
        _ if limited => StoreError::RateLimited { path },
        StatusCode::NOT_FOUND => StoreError::NotFound { path },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized { path },
        StatusCode::CONFLICT => StoreError::Conflict { path, detail },
        StatusCode::UNPROCESSABLE_ENTITY if writing && detail.contains("sha") => {
            StoreError::Conflict { path, detail }
        },
        s if s.is_server_error() => StoreError::Network {
            path,
            detail: format!("HTTP {}: {detail}", s.as_u16()),
        },
        s => StoreError::Rejected {
            path,
            status: s.as_u16(),
            detail,
        },
    }
}

fn decode_base64(path: &str, content: &str) -> StoreResult<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| StoreError::malformed(path, format!("invalid base64 content: {e}")))
}

#[async_trait]
impl RemoteStore for GitHubStore {
    #[instrument(skip(self))]
    async fn read(&self, path: &str) -> StoreResult<RemoteObject> {
        let response = self.get(path, JSON_MEDIA_TYPE).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::malformed(path, e.to_string()))?;
        if body.is_array() {
            return Err(StoreError::malformed(path, "path is a directory"));
        }
        let meta: ContentResponse = serde_json::from_value(body)
            .map_err(|e| StoreError::malformed(path, e.to_string()))?;
        if meta.kind.as_deref().is_some_and(|k| k != "file") {
            return Err(StoreError::malformed(path, "path is not a file"));
        }

        let content = match (meta.encoding.as_deref(), meta.content.as_deref()) {
            (Some("base64"), Some(encoded)) => decode_base64(path, encoded)?,
            _ => {
                debug!("Content not inlined, fetching raw");
                self.read_raw(path).await?
            },
        };

        Ok(RemoteObject {
            path: path.to_string(),
            content,
            version: VersionHandle::new(meta.sha),
        })
    }

    #[instrument(skip(self, content, version), fields(bytes = content.len()))]
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        version: Option<&VersionHandle>,
    ) -> StoreResult<VersionHandle> {
        let url = self.contents_url(path)?;
        let request = PutRequest {
            message,
            content: STANDARD.encode(content),
            branch: &self.branch,
            sha: version.map(VersionHandle::as_str),
        };

        let response = self
            .authorized(self.client.put(url), JSON_MEDIA_TYPE)
            .json(&request)
            .send()
            .await
            .map_err(|e| StoreError::network(path, e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify(path, response, true).await);
        }

        let body: PutResponse = response
            .json()
            .await
            .map_err(|e| StoreError::malformed(path, e.to_string()))?;
        Ok(VersionHandle::new(body.content.sha))
    }

    #[instrument(skip(self))]
    async fn list(&self, folder: &str) -> StoreResult<Vec<RemoteEntry>> {
        let response = self.get(folder, JSON_MEDIA_TYPE).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::malformed(folder, e.to_string()))?;
        if !body.is_array() {
            return Err(StoreError::malformed(folder, "path is not a directory"));
        }
        let entries: Vec<DirectoryEntry> = serde_json::from_value(body)
            .map_err(|e| StoreError::malformed(folder, e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|entry| RemoteEntry {
                kind: if entry.kind == "dir" {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                name: entry.name,
                path: entry.path,
            })
            .collect())
    }
}
