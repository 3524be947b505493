//! Share of residents who are immigrants, per Telemark municipality
//!
//! SSB table 09817, latest year only. Published as
//! `Kommune, Andel bosatt <year>, Label` with the share truncated to an
//! integer.

use async_trait::async_trait;
use odp_common::{Cell, Table};
use odp_ingest::extractor::{Extractor, ExtractorContext};
use odp_ingest::fetch::{FetchRequest, ResponseKind};
use odp_ingest::publish::PublishRequest;
use odp_ingest::{IngestError, Result};
use serde_json::{json, Value};
use tracing::info;

use crate::{ssb_table_url, INNVANDRERBEFOLKNINGEN_FOLDER, TELEMARK_MUNICIPALITIES};

pub const TASK_NAME: &str = "Innvandrere - Bosatt";
pub const ARTIFACT_NAME: &str = "andel_innvandrere_bosatt.csv";

const TABLE_ID: &str = "09817";
const REGION: &str = "region";
const YEAR: &str = "år";
const VALUE: &str = "value";

/// PxWeb query: immigrants (category B), all countries, share of population,
/// most recent year
pub fn query() -> Value {
    json!({
        "query": [
            {
                "code": "Region",
                "selection": { "filter": "agg_single:KommGjeldende", "values": TELEMARK_MUNICIPALITIES }
            },
            { "code": "InnvandrKat", "selection": { "filter": "item", "values": ["B"] } },
            { "code": "Landbakgrunn", "selection": { "filter": "item", "values": ["999"] } },
            { "code": "ContentsCode", "selection": { "filter": "item", "values": ["AndelBefolkning"] } },
            { "code": "Tid", "selection": { "filter": "top", "values": ["1"] } }
        ],
        "response": { "format": "json-stat2" }
    })
}

/// Latest value of the year dimension
fn latest_year(table: &Table) -> Result<String> {
    table
        .column(YEAR)
        .ok_or_else(|| IngestError::transform(format!("response has no '{YEAR}' dimension")))?
        .cells()
        .iter()
        .filter(|cell| !cell.is_null())
        .map(Cell::to_canonical)
        .max()
        .ok_or_else(|| IngestError::transform("response has no year values"))
}

fn truncate(cell: &Cell) -> Cell {
    match cell {
        Cell::Real(v) if v.is_finite() => Cell::Int(v.trunc() as i64),
        other => other.clone(),
    }
}

/// Flattened JSON-stat response to the published layout
pub fn reshape(table: &Table) -> Result<Table> {
    let year = latest_year(table)?;

    let mut out = table.select(&[REGION, VALUE])?;
    out.map_column(VALUE, truncate)?;
    out.rename(REGION, "Kommune")?;
    out.rename(VALUE, format!("Andel bosatt {year}"))?;

    let labels = out
        .column("Kommune")
        .map(|column| column.cells().to_vec())
        .unwrap_or_default();
    Ok(out.with_column("Label", labels)?)
}

pub struct InnvandrereBosatt {
    url: String,
}

impl InnvandrereBosatt {
    pub fn new() -> Self {
        Self::with_url(ssb_table_url(TABLE_ID))
    }

    /// Query a different endpoint, e.g. a mock server
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for InnvandrereBosatt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for InnvandrereBosatt {
    fn task_name(&self) -> &str {
        TASK_NAME
    }

    async fn run(&self, ctx: &mut ExtractorContext) -> Result<()> {
        let request = FetchRequest::post(&self.url, query(), ResponseKind::JsonStat);
        let table = match ctx.fetch_table(&request).await {
            Ok(table) => table,
            Err(e) if e.is_empty() => {
                info!(url = %self.url, "No rows from SSB, keeping published data");
                ctx.record_unchanged(ARTIFACT_NAME);
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };

        let shaped = reshape(&table)?;
        info!(rows = shaped.len(), "Reshaped bosatt table");
        ctx.publish(&shaped, &PublishRequest::new(ARTIFACT_NAME, INNVANDRERBEFOLKNINGEN_FOLDER))
            .await?;
        Ok(())
    }
}
