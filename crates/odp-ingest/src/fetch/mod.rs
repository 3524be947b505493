//! Dataset retrieval
//!
//! A [`Fetcher`] performs exactly one HTTP request per call (no retries) and
//! decodes the body according to the request's [`ResponseKind`].

pub mod error;
pub mod excel;
pub mod html;
pub mod json;
pub mod jsonstat;

use std::time::Duration;

use odp_common::artifact::{self, CsvOptions};
use odp_common::Table;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

pub use error::{DecodeError, FetchError, FetchErrorKind, FetchResult};
pub use excel::Workbook;
pub use odp_common::artifact::TextEncoding;

// ============================================================================
// Fetch Constants
// ============================================================================

/// Request timeout; statistics APIs can be slow on large queries
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

const ERROR_BODY_LIMIT: usize = 500;

/// How to decode a response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseKind {
    /// JSON-stat 2.0 dataset, flattened to a table
    JsonStat,
    /// Delimited text
    Csv(CsvOptions),
    /// Any JSON document, returned as-is
    RawJson,
    /// `.xlsx` workbook, one table per sheet
    ExcelBook,
    /// The `index`-th `<table>` of an HTML page
    HtmlTable { index: usize },
}

/// One fetch: GET when `body` is `None`, POST with a JSON body otherwise
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub body: Option<Value>,
    pub kind: ResponseKind,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, kind: ResponseKind) -> Self {
        Self {
            url: url.into(),
            body: None,
            kind,
        }
    }

    pub fn post(url: impl Into<String>, body: Value, kind: ResponseKind) -> Self {
        Self {
            url: url.into(),
            body: Some(body),
            kind,
        }
    }
}

/// A decoded response
#[derive(Debug, Clone)]
pub enum Fetched {
    Table(Table),
    Json(Value),
    Workbook(Workbook),
}

/// HTTP dataset client
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
            .user_agent(concat!("odp-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch and decode one resource
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult<Fetched> {
        let url = request.url.as_str();
        let bytes = self.send(request).await?;
        debug!(bytes = bytes.len(), "Response received");

        let fetched = match &request.kind {
            ResponseKind::JsonStat => {
                let document = json::decode(&bytes).map_err(|e| e.at(url))?;
                Fetched::Table(jsonstat::decode(document).map_err(|e| e.at(url))?)
            },
            ResponseKind::Csv(options) => Fetched::Table(
                artifact::decode_delimited(&bytes, options)
                    .map_err(|e| DecodeError::from(e).at(url))?,
            ),
            ResponseKind::RawJson => Fetched::Json(json::decode(&bytes).map_err(|e| e.at(url))?),
            ResponseKind::ExcelBook => {
                Fetched::Workbook(excel::decode(bytes).map_err(|e| e.at(url))?)
            },
            ResponseKind::HtmlTable { index } => {
                Fetched::Table(html::decode(&bytes, *index).map_err(|e| e.at(url))?)
            },
        };

        let empty = match &fetched {
            Fetched::Table(table) => table.is_empty(),
            Fetched::Workbook(sheets) => sheets.values().all(Table::is_empty),
            Fetched::Json(_) => false,
        };
        if empty {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }
        Ok(fetched)
    }

    /// Fetch a resource that decodes to a single table
    pub async fn fetch_table(&self, request: &FetchRequest) -> FetchResult<Table> {
        match self.fetch(request).await? {
            Fetched::Table(table) => Ok(table),
            _ => Err(shape_mismatch(request, "a single table")),
        }
    }

    pub async fn fetch_json(&self, url: &str, body: Option<Value>) -> FetchResult<Value> {
        let request = FetchRequest {
            url: url.to_string(),
            body,
            kind: ResponseKind::RawJson,
        };
        match self.fetch(&request).await? {
            Fetched::Json(value) => Ok(value),
            _ => Err(shape_mismatch(&request, "JSON")),
        }
    }

    pub async fn fetch_workbook(&self, url: &str) -> FetchResult<Workbook> {
        let request = FetchRequest::get(url, ResponseKind::ExcelBook);
        match self.fetch(&request).await? {
            Fetched::Workbook(sheets) => Ok(sheets),
            _ => Err(shape_mismatch(&request, "a workbook")),
        }
    }

    async fn send(&self, request: &FetchRequest) -> FetchResult<Vec<u8>> {
        let url = request.url.as_str();
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            detail: e.to_string(),
        };

        let builder = match &request.body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };
        let response = builder.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let mut detail = response.text().await.unwrap_or_default();
            if detail.len() > ERROR_BODY_LIMIT {
                let cut = (0..=ERROR_BODY_LIMIT)
                    .rev()
                    .find(|&i| detail.is_char_boundary(i))
                    .unwrap_or(0);
                detail.truncate(cut);
            }
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response.bytes().await.map_err(transport)?.to_vec())
    }
}

fn shape_mismatch(request: &FetchRequest, expected: &str) -> FetchError {
    FetchError::Decode {
        url: request.url.clone(),
        detail: format!("{:?} does not decode to {expected}", request.kind),
    }
}
