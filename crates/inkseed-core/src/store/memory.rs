//! In-process store for tests.
//!
//! Supports injected latency and failures so concurrency and isolation
//! behavior can be exercised without a database. Only built for this crate's
//! tests or with the `test-util` feature.

use super::{EpisodeData, RefKind, Row, SeedStore, UserData, WorkData, WorkLinks};
use crate::config::EntityKind;
use crate::error::{Result, SeedError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<Row<UserData>>,
    works: Vec<Row<WorkData>>,
    episodes: Vec<Row<EpisodeData>>,
    links: HashMap<i64, WorkLinks>,
    references: HashMap<(RefKind, String), i64>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    latency: Option<Duration>,
    unreachable: bool,
    failing_keys: HashSet<String>,
    failing_once: Mutex<HashSet<String>>,
    reference_creates: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every store operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make [`SeedStore::ping`] fail.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Fail inserts and updates whose natural key (email, slug or reference
    /// name) equals `key`.
    pub fn fail_writes_for(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    /// Fail only the next insert or update for `key`; later writes succeed.
    pub fn fail_once_for(self, key: impl Into<String>) -> Self {
        self.failing_once
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into());
        self
    }

    /// Number of `create_reference` calls seen.
    pub fn reference_creates(&self) -> u64 {
        self.reference_creates.load(Ordering::SeqCst)
    }

    /// Number of inserts and updates applied.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_key(&self, key: &str) -> Result<()> {
        let once = self
            .failing_once
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        if once || self.failing_keys.contains(key) {
            return Err(SeedError::persistence(key, "injected write failure"));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn unique_violation(table: &str, key: &str) -> SeedError {
    SeedError::persistence(key, format!("UNIQUE constraint failed: {table}"))
}

/// Every linked id must name a reference row of the matching kind.
fn check_links(tables: &Tables, slug: &str, links: &WorkLinks) -> Result<()> {
    let groups = [
        (RefKind::Author, &links.authors),
        (RefKind::Artist, &links.artists),
        (RefKind::Genre, &links.genres),
    ];
    for (kind, ids) in groups {
        for id in ids {
            let known = tables
                .references
                .iter()
                .any(|((k, _), ref_id)| *k == kind && ref_id == id);
            if !known {
                return Err(SeedError::persistence(slug, "FOREIGN KEY constraint failed"));
            }
        }
    }
    Ok(())
}

fn missing_row(table: &str, id: i64) -> SeedError {
    SeedError::persistence(format!("{table}#{id}"), "row does not exist")
}

#[async_trait]
impl SeedStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.delay().await;
        if self.unreachable {
            return Err(SeedError::Database {
                message: "connection refused".to_string(),
                source: None,
            });
        }
        Ok(())
    }

    async fn find_user(&self, email: &str) -> Result<Option<Row<UserData>>> {
        self.delay().await;
        Ok(self.tables().users.iter().find(|r| r.data.email == email).cloned())
    }

    async fn insert_user(&self, user: &UserData) -> Result<i64> {
        self.delay().await;
        self.check_key(&user.email)?;
        let mut tables = self.tables();
        if tables.users.iter().any(|r| r.data.email == user.email) {
            return Err(unique_violation("users.email", &user.email));
        }
        let id = tables.next_id();
        tables.users.push(Row {
            id,
            data: user.clone(),
        });
        self.record_write();
        Ok(id)
    }

    async fn update_user(&self, id: i64, user: &UserData) -> Result<()> {
        self.delay().await;
        self.check_key(&user.email)?;
        let mut tables = self.tables();
        let row = tables
            .users
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| missing_row("users", id))?;
        row.data = user.clone();
        self.record_write();
        Ok(())
    }

    async fn find_work(&self, slug: &str) -> Result<Option<Row<WorkData>>> {
        self.delay().await;
        Ok(self.tables().works.iter().find(|r| r.data.slug == slug).cloned())
    }

    async fn insert_work(&self, work: &WorkData, links: &WorkLinks) -> Result<i64> {
        self.delay().await;
        self.check_key(&work.slug)?;
        let mut tables = self.tables();
        if tables.works.iter().any(|r| r.data.slug == work.slug) {
            return Err(unique_violation("works.slug", &work.slug));
        }
        check_links(&tables, &work.slug, links)?;
        let id = tables.next_id();
        tables.works.push(Row {
            id,
            data: work.clone(),
        });
        tables.links.insert(id, links.clone());
        self.record_write();
        Ok(id)
    }

    async fn update_work(&self, id: i64, work: &WorkData, links: &WorkLinks) -> Result<()> {
        self.delay().await;
        self.check_key(&work.slug)?;
        let mut tables = self.tables();
        check_links(&tables, &work.slug, links)?;
        let row = tables
            .works
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| missing_row("works", id))?;
        row.data = work.clone();
        tables.links.insert(id, links.clone());
        self.record_write();
        Ok(())
    }

    async fn work_links(&self, work_id: i64) -> Result<WorkLinks> {
        self.delay().await;
        Ok(self.tables().links.get(&work_id).cloned().unwrap_or_default())
    }

    async fn find_episode(&self, work_id: i64, number: f64) -> Result<Option<Row<EpisodeData>>> {
        self.delay().await;
        Ok(self
            .tables()
            .episodes
            .iter()
            .find(|r| r.data.work_id == work_id && r.data.number == number)
            .cloned())
    }

    async fn insert_episode(&self, episode: &EpisodeData) -> Result<i64> {
        self.delay().await;
        self.check_key(&episode.slug)?;
        let mut tables = self.tables();
        if !tables.works.iter().any(|r| r.id == episode.work_id) {
            return Err(SeedError::persistence(
                &episode.slug,
                "FOREIGN KEY constraint failed",
            ));
        }
        if tables.episodes.iter().any(|r| {
            r.data.slug == episode.slug
                || (r.data.work_id == episode.work_id && r.data.number == episode.number)
        }) {
            return Err(unique_violation("episodes", &episode.slug));
        }
        let id = tables.next_id();
        tables.episodes.push(Row {
            id,
            data: episode.clone(),
        });
        self.record_write();
        Ok(id)
    }

    async fn update_episode(&self, id: i64, episode: &EpisodeData) -> Result<()> {
        self.delay().await;
        self.check_key(&episode.slug)?;
        let mut tables = self.tables();
        let row = tables
            .episodes
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| missing_row("episodes", id))?;
        row.data = episode.clone();
        self.record_write();
        Ok(())
    }

    async fn find_reference(&self, kind: RefKind, name: &str) -> Result<Option<i64>> {
        self.delay().await;
        Ok(self
            .tables()
            .references
            .get(&(kind, name.to_string()))
            .copied())
    }

    async fn create_reference(&self, kind: RefKind, name: &str) -> Result<i64> {
        self.reference_creates.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.check_key(name)?;
        let mut tables = self.tables();
        if let Some(id) = tables.references.get(&(kind, name.to_string())) {
            return Ok(*id);
        }
        let id = tables.next_id();
        tables.references.insert((kind, name.to_string()), id);
        Ok(id)
    }

    async fn delete_all(&self, entity: EntityKind) -> Result<u64> {
        self.delay().await;
        let mut tables = self.tables();
        let deleted = match entity {
            EntityKind::Users => std::mem::take(&mut tables.users).len(),
            EntityKind::Episodes => std::mem::take(&mut tables.episodes).len(),
            EntityKind::Works => {
                tables.links.clear();
                tables.episodes.clear();
                std::mem::take(&mut tables.works).len()
            }
        };
        Ok(deleted as u64)
    }

    async fn count(&self, entity: EntityKind) -> Result<u64> {
        self.delay().await;
        let tables = self.tables();
        let count = match entity {
            EntityKind::Users => tables.users.len(),
            EntityKind::Works => tables.works.len(),
            EntityKind::Episodes => tables.episodes.len(),
        };
        Ok(count as u64)
    }

    async fn count_references(&self, kind: RefKind) -> Result<u64> {
        self.delay().await;
        Ok(self
            .tables()
            .references
            .keys()
            .filter(|(k, _)| *k == kind)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_ping_fails() {
        assert!(MemoryStore::new().ping().await.is_ok());
        assert!(MemoryStore::new().unreachable().ping().await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure_only_hits_matching_key() {
        let store = MemoryStore::new().fail_writes_for("bad@x.io");
        let user = |email: &str| UserData {
            email: email.to_string(),
            name: "n".to_string(),
            role: "reader".to_string(),
            avatar_url: None,
            bio: None,
        };
        assert!(store.insert_user(&user("bad@x.io")).await.is_err());
        assert!(store.insert_user(&user("ok@x.io")).await.is_ok());
        assert_eq!(store.count(EntityKind::Users).await.unwrap(), 1);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_work_with_unknown_link_is_not_written() {
        let store = MemoryStore::new();
        let work = WorkData {
            slug: "w".to_string(),
            title: "W".to_string(),
            alternative_titles: vec![],
            description: None,
            cover_url: None,
            status: "ongoing".to_string(),
            category_id: None,
            release_year: None,
            rating: None,
            views: 0,
        };
        let dangling = WorkLinks {
            authors: vec![42],
            ..WorkLinks::default()
        };
        assert!(store.insert_work(&work, &dangling).await.is_err());
        assert!(store.find_work("w").await.unwrap().is_none());

        let author = store.create_reference(RefKind::Author, "A").await.unwrap();
        let links = WorkLinks {
            authors: vec![author],
            ..WorkLinks::default()
        };
        let id = store.insert_work(&work, &links).await.unwrap();
        assert_eq!(store.work_links(id).await.unwrap(), links);
    }

    #[tokio::test]
    async fn test_fail_once_recovers() {
        let store = MemoryStore::new().fail_once_for("Flaky");
        assert!(store.create_reference(RefKind::Genre, "Flaky").await.is_err());
        assert!(store.create_reference(RefKind::Genre, "Flaky").await.is_ok());
    }

    #[tokio::test]
    async fn test_references_counted_per_kind() {
        let store = MemoryStore::new();
        store.create_reference(RefKind::Genre, "Action").await.unwrap();
        store.create_reference(RefKind::Genre, "Action").await.unwrap();
        store.create_reference(RefKind::Author, "Action").await.unwrap();
        assert_eq!(store.count_references(RefKind::Genre).await.unwrap(), 1);
        assert_eq!(store.count_references(RefKind::Author).await.unwrap(), 1);
        assert_eq!(store.reference_creates(), 3);
    }
}
