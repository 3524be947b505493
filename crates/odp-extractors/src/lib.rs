//! ODP Extractors
//!
//! Indicator extractors for the Telemark open-data pipeline. Each module
//! holds one [`Extractor`](odp_ingest::extractor::Extractor) and the
//! reshaping it applies; the binaries under `src/bin` only hand it to
//! [`run_extractor`](odp_ingest::extractor::run_extractor).

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod innvandrere_bosatt;
pub mod innvandringsgrunn;

/// Remote folder for the immigrant population indicators
pub const INNVANDRERBEFOLKNINGEN_FOLDER: &str = "Data/09_Innvandrere og inkludering/Innvandrerbefolkningen";

/// County prefix shared by every Telemark municipality number
pub const TELEMARK_COUNTY_PREFIX: &str = "40";

/// Current Telemark municipality numbers
pub const TELEMARK_MUNICIPALITIES: [&str; 17] = [
    "4001", "4003", "4005", "4010", "4012", "4014", "4016", "4018", "4020", "4022", "4024", "4026",
    "4028", "4030", "4032", "4034", "4036",
];

const SSB_TABLE_API: &str = "https://data.ssb.no/api/v0/no/table";

/// PxWeb endpoint for an SSB statistics table
pub fn ssb_table_url(table_id: &str) -> String {
    format!("{SSB_TABLE_API}/{table_id}/")
}
