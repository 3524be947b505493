//! ODP Common Library
//!
//! Shared types, configuration, and error handling for the Telemark open-data
//! pipeline.
//!
//! # Overview
//!
//! This crate provides the pieces every workspace member agrees on:
//!
//! - **Tables**: The in-memory [`Table`] model and the on-disk artifact codec
//! - **Run records**: Task outcomes, verdicts, and the per-task status file line
//! - **Settings**: Environment and secrets-file configuration
//! - **Logging**: `tracing` subscriber setup shared by the runner and extractors
//!
//! # Example
//!
//! ```no_run
//! use odp_common::{artifact, Cell, Table};
//!
//! fn write() -> odp_common::Result<()> {
//!     let table = Table::new(
//!         vec!["Kommune".into(), "Antall".into()],
//!         vec![vec![Cell::from("Skien"), Cell::Int(12)]],
//!     )?;
//!     artifact::write_artifact(&table, "/tmp/antall.csv")?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod artifact;
pub mod config;
pub mod error;
pub mod logging;
pub mod table;
pub mod types;

// Re-export commonly used types
pub use config::{Secret, Settings};
pub use error::{OdpError, Result};
pub use table::{Cell, Column, ColumnKind, Table};
pub use types::{Outcome, StatusLine, TaskRecord, Verdict};
