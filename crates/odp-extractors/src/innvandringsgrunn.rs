//! Immigrants by reason for immigration, per municipality
//!
//! IMDi serves the dataset only as a CSV download (ISO-8859-1, semicolon
//! delimited). Rows outside Telemark are dropped; the columns are published
//! as they come.

use async_trait::async_trait;
use odp_common::artifact::CsvOptions;
use odp_common::{Cell, Table};
use odp_ingest::extractor::{Extractor, ExtractorContext};
use odp_ingest::fetch::{FetchRequest, ResponseKind};
use odp_ingest::publish::PublishRequest;
use odp_ingest::{IngestError, Result};
use tracing::{info, warn};

use crate::{INNVANDRERBEFOLKNINGEN_FOLDER, TELEMARK_COUNTY_PREFIX};

pub const TASK_NAME: &str = "Innvandrere - Innvandringsgrunn";
pub const ARTIFACT_NAME: &str = "innvandringsgrunn_telemark.csv";

const SOURCE_URL: &str = "https://app-simapi-prod.azurewebsites.net/download_csv/k/befolkning_innvandringsgrunn";
const MUNICIPALITY_NUMBER: &str = "Kommunenummer";

fn in_telemark(cell: &Cell) -> bool {
    cell.to_canonical().trim().starts_with(TELEMARK_COUNTY_PREFIX)
}

/// Keep Telemark rows only
pub fn reshape(table: &Table) -> Result<Table> {
    let index = table
        .column_index(MUNICIPALITY_NUMBER)
        .ok_or_else(|| IngestError::transform(format!("download has no '{MUNICIPALITY_NUMBER}' column")))?;
    Ok(table.filter_rows(|row| in_telemark(row[index])))
}

pub struct Innvandringsgrunn {
    url: String,
}

impl Innvandringsgrunn {
    pub fn new() -> Self {
        Self::with_url(SOURCE_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for Innvandringsgrunn {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for Innvandringsgrunn {
    fn task_name(&self) -> &str {
        TASK_NAME
    }

    async fn run(&self, ctx: &mut ExtractorContext) -> Result<()> {
        let request = FetchRequest::get(&self.url, ResponseKind::Csv(CsvOptions::default()));
        let table = match ctx.fetch_table(&request).await {
            Ok(table) => table,
            Err(e) if e.is_empty() => {
                info!(url = %self.url, "Download has no rows, keeping published data");
                ctx.record_unchanged(ARTIFACT_NAME);
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };

        let shaped = reshape(&table)?;
        if shaped.is_empty() {
            warn!(rows = table.len(), "No Telemark rows in download, keeping published data");
            ctx.record_unchanged(ARTIFACT_NAME);
            return Ok(());
        }

        info!(rows = shaped.len(), dropped = table.len() - shaped.len(), "Filtered to Telemark");
        ctx.publish(&shaped, &PublishRequest::new(ARTIFACT_NAME, INNVANDRERBEFOLKNINGEN_FOLDER))
            .await?;
        Ok(())
    }
}
