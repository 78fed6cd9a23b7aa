//! Media pipeline.
//!
//! Remote images referenced by records (avatars, covers, chapter pages) are
//! downloaded, hashed with SHA-256 and uploaded once per distinct content.
//! Two caches prevent repeated work: one keyed by source URL, one keyed by
//! content hash. Both are single-flight per key.

mod cache;
mod fetch;
mod hashing;
mod persist;
mod pipeline;
mod storage;

pub use cache::{MediaCache, MediaStats};
pub use fetch::MediaFetcher;
pub use hashing::{sha256_hex, sniff_extension};
pub use persist::{CachedMappings, SqliteMediaCache};
pub use pipeline::MediaPipeline;
pub use storage::{LocalMediaStorage, MediaStorage};
