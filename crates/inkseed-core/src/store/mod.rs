//! Store collaborator.
//!
//! The pipeline only talks to the relational store through [`SeedStore`]:
//! natural-key lookups, inserts, updates and bulk deletes per entity, plus the
//! reference tables the resolver fills and the work association rows.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod sqlite;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::EntityKind;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Referenced entity kinds resolved by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Author,
    Artist,
    Genre,
    Category,
}

impl RefKind {
    pub const ALL: [RefKind; 4] = [RefKind::Author, RefKind::Artist, RefKind::Genre, RefKind::Category];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Author => "author",
            RefKind::Artist => "artist",
            RefKind::Genre => "genre",
            RefKind::Category => "category",
        }
    }

    /// Name used when the source value is blank or a placeholder.
    pub fn sentinel(&self) -> &'static str {
        match self {
            RefKind::Author | RefKind::Artist => "Unknown",
            RefKind::Genre => "Other",
            RefKind::Category => "Uncategorized",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            RefKind::Author => "authors",
            RefKind::Artist => "artists",
            RefKind::Genre => "genres",
            RefKind::Category => "categories",
        }
    }
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored row with its surrogate id.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<T> {
    pub id: i64,
    pub data: T,
}

/// Column values for a user row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserData {
    pub email: String,
    pub name: String,
    pub role: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// Column values for a work row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkData {
    pub slug: String,
    pub title: String,
    pub alternative_titles: Vec<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub status: String,
    pub category_id: Option<i64>,
    pub release_year: Option<i64>,
    pub rating: Option<f64>,
    pub views: i64,
}

/// Association rows between a work and its referenced entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkLinks {
    pub authors: Vec<i64>,
    pub artists: Vec<i64>,
    pub genres: Vec<i64>,
}

/// Column values for an episode row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeData {
    pub work_id: i64,
    pub number: f64,
    pub slug: String,
    pub title: Option<String>,
    pub image_urls: Vec<String>,
    /// RFC 3339 timestamp.
    pub release_date: Option<String>,
    pub views: i64,
}

/// Repository interface the pipeline writes through.
///
/// Natural keys: users by email, works by slug, episodes by `(work_id, number)`,
/// reference rows by `(kind, name)`.
#[async_trait]
pub trait SeedStore: Send + Sync {
    /// Verify the store is reachable.
    async fn ping(&self) -> Result<()>;

    async fn find_user(&self, email: &str) -> Result<Option<Row<UserData>>>;
    async fn insert_user(&self, user: &UserData) -> Result<i64>;
    async fn update_user(&self, id: i64, user: &UserData) -> Result<()>;

    async fn find_work(&self, slug: &str) -> Result<Option<Row<WorkData>>>;

    /// Insert a work together with its association rows. Either both are
    /// written or neither is.
    async fn insert_work(&self, work: &WorkData, links: &WorkLinks) -> Result<i64>;

    /// Update a work and replace all of its association rows, atomically.
    async fn update_work(&self, id: i64, work: &WorkData, links: &WorkLinks) -> Result<()>;

    async fn work_links(&self, work_id: i64) -> Result<WorkLinks>;

    async fn find_episode(&self, work_id: i64, number: f64) -> Result<Option<Row<EpisodeData>>>;
    async fn insert_episode(&self, episode: &EpisodeData) -> Result<i64>;
    async fn update_episode(&self, id: i64, episode: &EpisodeData) -> Result<()>;

    async fn find_reference(&self, kind: RefKind, name: &str) -> Result<Option<i64>>;
    async fn create_reference(&self, kind: RefKind, name: &str) -> Result<i64>;

    /// Delete every row of an entity. Deleting works also removes their
    /// association rows and episodes.
    async fn delete_all(&self, entity: EntityKind) -> Result<u64>;

    async fn count(&self, entity: EntityKind) -> Result<u64>;
    async fn count_references(&self, kind: RefKind) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(RefKind::Author.sentinel(), "Unknown");
        assert_eq!(RefKind::Artist.sentinel(), "Unknown");
        assert_eq!(RefKind::Genre.sentinel(), "Other");
        assert_eq!(RefKind::Category.sentinel(), "Uncategorized");
    }

    #[test]
    fn test_tables_are_distinct() {
        let mut tables: Vec<&str> = RefKind::ALL.iter().map(|k| k.table()).collect();
        tables.dedup();
        assert_eq!(tables.len(), 4);
    }
}
