//! Innvandrere - Innvandringsgrunn

use std::process::ExitCode;

use odp_extractors::innvandringsgrunn::Innvandringsgrunn;
use odp_ingest::extractor::run_extractor;

#[tokio::main]
async fn main() -> ExitCode {
    run_extractor(Innvandringsgrunn::new()).await
}
