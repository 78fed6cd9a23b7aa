//! Relationship resolver.
//!
//! Maps `(kind, name)` pairs found in work records to reference row ids,
//! creating rows on first sight. Ids are memoized for the lifetime of the run
//! and creation is single-flight per key, so concurrent records naming the
//! same new contributor produce exactly one row.

use crate::concurrency::SingleFlight;
use crate::error::{Result, SeedError};
use crate::store::{RefKind, SeedStore};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Source values treated as "no value" (compared case-insensitively).
const PLACEHOLDER_NAMES: &[&str] = &["", "unknown", "n/a", "none", "-", "null", "updating", "?"];

/// Canonical display name for a reference, or the kind's sentinel.
///
/// Trims and collapses inner whitespace. Case is preserved, so `Action` and
/// `action` are distinct references.
pub fn normalize_name(kind: RefKind, raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let lowered = collapsed.to_lowercase();
    if PLACEHOLDER_NAMES.contains(&lowered.as_str()) {
        kind.sentinel().to_string()
    } else {
        collapsed
    }
}

/// Resolver counters for the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Lookups answered from the memo.
    pub hits: u64,
    /// Lookups that consulted the store.
    pub misses: u64,
    /// Rows created in the store.
    pub created: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    created: AtomicU64,
}

/// Memoizing get-or-create over the store's reference tables.
pub struct RelationshipResolver {
    store: Arc<dyn SeedStore>,
    memo: SingleFlight<(RefKind, String), i64>,
    counters: Counters,
}

impl RelationshipResolver {
    pub fn new(store: Arc<dyn SeedStore>) -> Self {
        Self {
            store,
            memo: SingleFlight::new(),
            counters: Counters::default(),
        }
    }

    /// Resolve one name to a row id, creating the row if needed.
    pub async fn get_or_create(&self, kind: RefKind, raw_name: &str) -> Result<i64> {
        let name = normalize_name(kind, raw_name);
        let key = (kind, name.clone());

        if let Some(id) = self.memo.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(id);
        }

        let store = &self.store;
        let counters = &self.counters;
        let lookup_name = name.as_str();
        let (id, initialized_here) = self
            .memo
            .get_or_try_init(key, || async move {
                counters.misses.fetch_add(1, Ordering::Relaxed);
                if let Some(id) = store.find_reference(kind, lookup_name).await? {
                    return Ok(id);
                }
                let id = store.create_reference(kind, lookup_name).await?;
                counters.created.fetch_add(1, Ordering::Relaxed);
                debug!("Created {} '{}'", kind, lookup_name);
                Ok::<i64, SeedError>(id)
            })
            .await
            .map_err(|e| SeedError::RelationshipResolution {
                kind: kind.to_string(),
                name: name.clone(),
                message: e.to_string(),
            })?;

        if !initialized_here {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(id)
    }

    /// Resolve a list of names, dropping duplicate ids while keeping first-seen order.
    pub async fn resolve_all(&self, kind: RefKind, names: &[String]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = self.get_or_create(kind, name).await?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            created: self.counters.created.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[test]
    fn test_placeholders_map_to_sentinels() {
        assert_eq!(normalize_name(RefKind::Author, ""), "Unknown");
        assert_eq!(normalize_name(RefKind::Artist, "  N/A "), "Unknown");
        assert_eq!(normalize_name(RefKind::Genre, "updating"), "Other");
        assert_eq!(normalize_name(RefKind::Category, "?"), "Uncategorized");
    }

    #[test]
    fn test_names_are_collapsed_but_case_kept() {
        assert_eq!(normalize_name(RefKind::Author, "  Lee   Hyun "), "Lee Hyun");
        assert_eq!(normalize_name(RefKind::Genre, "action"), "action");
        assert_ne!(
            normalize_name(RefKind::Genre, "Action"),
            normalize_name(RefKind::Genre, "action")
        );
    }

    #[tokio::test]
    async fn test_second_lookup_hits_memo() {
        let store = Arc::new(MemoryStore::new());
        let resolver = RelationshipResolver::new(store.clone());

        let a = resolver.get_or_create(RefKind::Genre, "Action").await.unwrap();
        let b = resolver.get_or_create(RefKind::Genre, " Action ").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.reference_creates(), 1);
        assert_eq!(
            resolver.stats(),
            ResolverStats {
                hits: 1,
                misses: 1,
                created: 1
            }
        );
    }

    #[tokio::test]
    async fn test_existing_row_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let existing = store.create_reference(RefKind::Author, "Chugong").await.unwrap();
        let resolver = RelationshipResolver::new(store.clone());

        assert_eq!(
            resolver.get_or_create(RefKind::Author, "Chugong").await.unwrap(),
            existing
        );
        assert_eq!(resolver.stats().created, 0);
    }

    #[tokio::test]
    async fn test_concurrent_new_name_creates_one_row() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
        let resolver = Arc::new(RelationshipResolver::new(store.clone()));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move {
                    resolver.get_or_create(RefKind::Author, "New Author").await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.reference_creates(), 1);
        assert_eq!(store.count_references(RefKind::Author).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_resolution_error_and_not_memoized() {
        let store = Arc::new(MemoryStore::new().fail_writes_for("Broken"));
        let resolver = RelationshipResolver::new(store.clone());

        let err = resolver
            .get_or_create(RefKind::Genre, "Broken")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RelationshipResolution);

        // A later attempt goes back to the store
        assert!(resolver.get_or_create(RefKind::Genre, "Broken").await.is_err());
        assert_eq!(store.reference_creates(), 2);
    }

    #[tokio::test]
    async fn test_resolve_all_dedups_placeholders() {
        let store = Arc::new(MemoryStore::new());
        let resolver = RelationshipResolver::new(store);
        let names = vec!["".to_string(), "unknown".to_string(), "Jang".to_string()];
        let ids = resolver.resolve_all(RefKind::Artist, &names).await.unwrap();
        assert_eq!(ids.len(), 2);
    }
}
