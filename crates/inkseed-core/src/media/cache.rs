//! Per-run media dedup caches.

use super::persist::CachedMappings;
use crate::concurrency::SingleFlight;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Media counters for the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaStats {
    /// Source URLs already relocated earlier.
    pub url_hits: u64,
    /// Downloads whose bytes matched an already stored object.
    pub hash_hits: u64,
    /// Source URLs that had to be downloaded.
    pub misses: u64,
    /// Objects written to storage.
    pub uploads: u64,
    /// Relocations that kept the original URL after a failure.
    pub fallbacks: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub url_hits: AtomicU64,
    pub hash_hits: AtomicU64,
    pub misses: AtomicU64,
    pub uploads: AtomicU64,
    pub fallbacks: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// `source URL -> stored URL` and `content hash -> stored URL`, each
/// single-flight per key.
#[derive(Default)]
pub struct MediaCache {
    pub(crate) by_url: SingleFlight<String, String>,
    pub(crate) by_hash: SingleFlight<String, String>,
    pub(crate) counters: Counters,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate from persisted mappings.
    pub fn preload(&self, mappings: CachedMappings) {
        for (url, stored) in mappings.by_url {
            self.by_url.insert(url, stored);
        }
        for (hash, stored) in mappings.by_hash {
            self.by_hash.insert(hash, stored);
        }
    }

    pub fn stored_for_url(&self, url: &str) -> Option<String> {
        self.by_url.get(&url.to_string())
    }

    pub fn stored_for_hash(&self, hash: &str) -> Option<String> {
        self.by_hash.get(&hash.to_string())
    }

    /// Number of distinct stored objects known to this run.
    pub fn object_count(&self) -> usize {
        self.by_hash.len()
    }

    pub fn stats(&self) -> MediaStats {
        let c = &self.counters;
        MediaStats {
            url_hits: c.url_hits.load(Ordering::Relaxed),
            hash_hits: c.hash_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            uploads: c.uploads.load(Ordering::Relaxed),
            fallbacks: c.fallbacks.load(Ordering::Relaxed),
        }
    }
}
