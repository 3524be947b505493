//! ODP Ingest Library
//!
//! Building blocks for extractors: fetch a dataset, reshape it, and publish
//! it to the remote store only when it differs semantically from what is
//! already there.
//!
//! - [`fetch`]: HTTP retrieval and decoding into tables
//! - [`store`]: Versioned remote file store (GitHub contents API, in-memory)
//! - [`compare`]: Semantic table comparison
//! - [`publish`]: Compare-then-upload gateway
//! - [`extractor`]: The contract every extractor binary follows
//! - [`mail`]: Mail sink client used for error and summary notifications

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod compare;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod mail;
pub mod publish;
pub mod store;

// Re-export commonly used types
pub use compare::{compare, equal, ComparePolicy, Comparison};
pub use error::{IngestError, Result};
pub use extractor::{run_extractor, Extractor, ExtractorContext, ExtractorReport};
pub use fetch::{FetchError, FetchRequest, Fetched, Fetcher, ResponseKind};
pub use publish::{PublishError, PublishRequest, PublishVerdict, Publisher};
pub use store::{RemoteStore, StoreError, VersionHandle};
