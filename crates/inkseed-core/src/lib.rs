//! Inkseed Core - JSON import pipeline for a comics catalogue.
//!
//! Seeds users, works (comics) and episodes (chapters) from loosely structured
//! JSON files into a relational store. Records are validated against a
//! tolerant field table, related names are resolved to reference rows, remote
//! images are relocated with content-hash deduplication, and rows are upserted
//! by natural key in bounded concurrent batches.
//!
//! # Example
//!
//! ```rust,ignore
//! use inkseed_core::{
//!     HttpClient, LocalMediaStorage, MediaPipeline, Orchestrator, RunMode, SeedOptions,
//!     SqliteStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> inkseed_core::Result<()> {
//!     let store = Arc::new(SqliteStore::open("inkseed.sqlite")?);
//!     let media = Arc::new(MediaPipeline::new(
//!         Arc::new(HttpClient::new()?),
//!         Arc::new(LocalMediaStorage::new("media")),
//!     ));
//!
//!     let report = Orchestrator::new(store, media, SeedOptions::new("data"))
//!         .run(RunMode::Seed)
//!         .await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod concurrency;
pub mod config;
pub mod discovery;
pub mod error;
pub mod media;
pub mod network;
pub mod orchestrator;
pub mod resolver;
pub mod schema;
pub mod seed;
pub mod store;

// Re-export commonly used types
pub use config::{EntityKind, MediaMode, RunMode, SeedOptions};
pub use discovery::SourceDiscoverer;
pub use error::{ErrorKind, Result, SeedError};
pub use media::{LocalMediaStorage, MediaFetcher, MediaPipeline, MediaStats, MediaStorage, SqliteMediaCache};
pub use network::HttpClient;
pub use orchestrator::{EntityReport, Orchestrator, RunReport, RunState};
pub use resolver::{RelationshipResolver, ResolverStats};
pub use seed::{BatchUpserter, SeedResult, StageProgress};
pub use store::{RefKind, SeedStore, SqliteStore};

#[cfg(any(test, feature = "test-util"))]
pub use store::MemoryStore;
