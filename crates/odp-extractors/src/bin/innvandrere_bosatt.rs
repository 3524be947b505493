//! Innvandrere - Bosatt

use std::process::ExitCode;

use odp_extractors::innvandrere_bosatt::InnvandrereBosatt;
use odp_ingest::extractor::run_extractor;

#[tokio::main]
async fn main() -> ExitCode {
    run_extractor(InnvandrereBosatt::new()).await
}
