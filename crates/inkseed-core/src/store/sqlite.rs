//! SQLite-backed store.

use super::{EpisodeData, RefKind, Row, SeedStore, UserData, WorkData, WorkLinks};
use crate::config::{EntityKind, StoreConfig};
use crate::error::{Result, SeedError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        avatar_url TEXT,
        bio TEXT
    );
    CREATE TABLE IF NOT EXISTS authors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS artists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS genres (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS works (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        alternative_titles_json TEXT NOT NULL,
        description TEXT,
        cover_url TEXT,
        status TEXT NOT NULL,
        category_id INTEGER REFERENCES categories(id),
        release_year INTEGER,
        rating REAL,
        views INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS work_authors (
        work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
        ref_id INTEGER NOT NULL REFERENCES authors(id),
        position INTEGER NOT NULL,
        PRIMARY KEY (work_id, ref_id)
    );
    CREATE TABLE IF NOT EXISTS work_artists (
        work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
        ref_id INTEGER NOT NULL REFERENCES artists(id),
        position INTEGER NOT NULL,
        PRIMARY KEY (work_id, ref_id)
    );
    CREATE TABLE IF NOT EXISTS work_genres (
        work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
        ref_id INTEGER NOT NULL REFERENCES genres(id),
        position INTEGER NOT NULL,
        PRIMARY KEY (work_id, ref_id)
    );
    CREATE TABLE IF NOT EXISTS episodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
        number REAL NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        title TEXT,
        image_urls_json TEXT NOT NULL,
        release_date TEXT,
        views INTEGER NOT NULL DEFAULT 0,
        UNIQUE (work_id, number)
    );
    CREATE INDEX IF NOT EXISTS idx_episodes_work ON episodes(work_id);
";

/// Link tables paired with the reference kind they point at.
const LINK_TABLES: [(&str, RefKind); 3] = [
    ("work_authors", RefKind::Author),
    ("work_artists", RefKind::Artist),
    ("work_genres", RefKind::Genre),
];

/// Relational store on a single SQLite connection.
pub struct SqliteStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open a database at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SeedError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn, true)?;
        conn.execute_batch(SCHEMA)?;

        debug!("Opened store at {}", db_path.display());
        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn, false)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection, wal: bool) -> Result<()> {
        if wal {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        }
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout={}; PRAGMA foreign_keys=ON; PRAGMA temp_store=MEMORY;",
            StoreConfig::BUSY_TIMEOUT_MS
        ))?;
        Ok(())
    }

    /// Database file, if not in-memory.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SeedError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<Row<UserData>> {
        Ok(Row {
            id: row.get(0)?,
            data: UserData {
                email: row.get(1)?,
                name: row.get(2)?,
                role: row.get(3)?,
                avatar_url: row.get(4)?,
                bio: row.get(5)?,
            },
        })
    }

    fn row_to_work(row: &rusqlite::Row) -> rusqlite::Result<Row<WorkData>> {
        let titles_json: String = row.get(3)?;
        Ok(Row {
            id: row.get(0)?,
            data: WorkData {
                slug: row.get(1)?,
                title: row.get(2)?,
                alternative_titles: serde_json::from_str(&titles_json).unwrap_or_default(),
                description: row.get(4)?,
                cover_url: row.get(5)?,
                status: row.get(6)?,
                category_id: row.get(7)?,
                release_year: row.get(8)?,
                rating: row.get(9)?,
                views: row.get(10)?,
            },
        })
    }

    fn row_to_episode(row: &rusqlite::Row) -> rusqlite::Result<Row<EpisodeData>> {
        let images_json: String = row.get(5)?;
        Ok(Row {
            id: row.get(0)?,
            data: EpisodeData {
                work_id: row.get(1)?,
                number: row.get(2)?,
                slug: row.get(3)?,
                title: row.get(4)?,
                image_urls: serde_json::from_str(&images_json).unwrap_or_default(),
                release_date: row.get(6)?,
                views: row.get(7)?,
            },
        })
    }

    /// Replace the association rows of a work inside an open transaction.
    fn write_links(tx: &Transaction<'_>, work_id: i64, links: &WorkLinks) -> rusqlite::Result<()> {
        for (table, kind) in LINK_TABLES {
            tx.execute(&format!("DELETE FROM {table} WHERE work_id = ?1"), params![work_id])?;
            let ids = match kind {
                RefKind::Author => &links.authors,
                RefKind::Artist => &links.artists,
                _ => &links.genres,
            };
            let sql = format!(
                "INSERT OR IGNORE INTO {table} (work_id, ref_id, position) VALUES (?1, ?2, ?3)"
            );
            for (position, ref_id) in ids.iter().enumerate() {
                tx.execute(&sql, params![work_id, ref_id, position as i64])?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SeedStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    async fn find_user(&self, email: &str) -> Result<Option<Row<UserData>>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, email, name, role, avatar_url, bio FROM users WHERE email = ?1",
                params![email],
                Self::row_to_user,
            )
            .optional()?;
        Ok(row)
    }

    async fn insert_user(&self, user: &UserData) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (email, name, role, avatar_url, bio) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.email, user.name, user.role, user.avatar_url, user.bio],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_user(&self, id: i64, user: &UserData) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET email = ?2, name = ?3, role = ?4, avatar_url = ?5, bio = ?6
             WHERE id = ?1",
            params![id, user.email, user.name, user.role, user.avatar_url, user.bio],
        )?;
        Ok(())
    }

    async fn find_work(&self, slug: &str) -> Result<Option<Row<WorkData>>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, slug, title, alternative_titles_json, description, cover_url,
                        status, category_id, release_year, rating, views
                 FROM works WHERE slug = ?1",
                params![slug],
                Self::row_to_work,
            )
            .optional()?;
        Ok(row)
    }

    async fn insert_work(&self, work: &WorkData, links: &WorkLinks) -> Result<i64> {
        let titles_json = serde_json::to_string(&work.alternative_titles)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO works (slug, title, alternative_titles_json, description, cover_url,
                               status, category_id, release_year, rating, views)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                work.slug,
                work.title,
                titles_json,
                work.description,
                work.cover_url,
                work.status,
                work.category_id,
                work.release_year,
                work.rating,
                work.views,
            ],
        )?;
        let id = tx.last_insert_rowid();
        Self::write_links(&tx, id, links)?;
        tx.commit()?;
        Ok(id)
    }

    async fn update_work(&self, id: i64, work: &WorkData, links: &WorkLinks) -> Result<()> {
        let titles_json = serde_json::to_string(&work.alternative_titles)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE works SET slug = ?2, title = ?3, alternative_titles_json = ?4,
                    description = ?5, cover_url = ?6, status = ?7, category_id = ?8,
                    release_year = ?9, rating = ?10, views = ?11
             WHERE id = ?1",
            params![
                id,
                work.slug,
                work.title,
                titles_json,
                work.description,
                work.cover_url,
                work.status,
                work.category_id,
                work.release_year,
                work.rating,
                work.views,
            ],
        )?;
        Self::write_links(&tx, id, links)?;
        tx.commit()?;
        Ok(())
    }

    async fn work_links(&self, work_id: i64) -> Result<WorkLinks> {
        let conn = self.conn()?;
        let mut links = WorkLinks::default();
        for (table, kind) in LINK_TABLES {
            let mut stmt = conn.prepare(&format!(
                "SELECT ref_id FROM {table} WHERE work_id = ?1 ORDER BY position"
            ))?;
            let ids = stmt
                .query_map(params![work_id], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            match kind {
                RefKind::Author => links.authors = ids,
                RefKind::Artist => links.artists = ids,
                _ => links.genres = ids,
            }
        }
        Ok(links)
    }

    async fn find_episode(&self, work_id: i64, number: f64) -> Result<Option<Row<EpisodeData>>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, work_id, number, slug, title, image_urls_json, release_date, views
                 FROM episodes WHERE work_id = ?1 AND number = ?2",
                params![work_id, number],
                Self::row_to_episode,
            )
            .optional()?;
        Ok(row)
    }

    async fn insert_episode(&self, episode: &EpisodeData) -> Result<i64> {
        let images_json = serde_json::to_string(&episode.image_urls)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO episodes (work_id, number, slug, title, image_urls_json, release_date, views)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                episode.work_id,
                episode.number,
                episode.slug,
                episode.title,
                images_json,
                episode.release_date,
                episode.views,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_episode(&self, id: i64, episode: &EpisodeData) -> Result<()> {
        let images_json = serde_json::to_string(&episode.image_urls)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE episodes SET work_id = ?2, number = ?3, slug = ?4, title = ?5,
                    image_urls_json = ?6, release_date = ?7, views = ?8
             WHERE id = ?1",
            params![
                id,
                episode.work_id,
                episode.number,
                episode.slug,
                episode.title,
                images_json,
                episode.release_date,
                episode.views,
            ],
        )?;
        Ok(())
    }

    async fn find_reference(&self, kind: RefKind, name: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                &format!("SELECT id FROM {} WHERE name = ?1", kind.table()),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    async fn create_reference(&self, kind: RefKind, name: &str) -> Result<i64> {
        let conn = self.conn()?;
        let table = kind.table();
        conn.execute(
            &format!("INSERT INTO {table} (name) VALUES (?1) ON CONFLICT(name) DO NOTHING"),
            params![name],
        )?;
        let id = conn.query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1"),
            params![name],
            |row| row.get(0),
        )?;
        debug!("Created {} '{}' ({})", kind, name, id);
        Ok(id)
    }

    async fn delete_all(&self, entity: EntityKind) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = match entity {
            EntityKind::Users => conn.execute("DELETE FROM users", [])?,
            EntityKind::Episodes => conn.execute("DELETE FROM episodes", [])?,
            EntityKind::Works => {
                for (table, _) in LINK_TABLES {
                    conn.execute(&format!("DELETE FROM {table}"), [])?;
                }
                conn.execute("DELETE FROM episodes", [])?;
                conn.execute("DELETE FROM works", [])?
            }
        };
        debug!("Deleted {} {}", deleted, entity);
        Ok(deleted as u64)
    }

    async fn count(&self, entity: EntityKind) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", entity.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn count_references(&self, kind: RefKind) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user(email: &str) -> UserData {
        UserData {
            email: email.to_string(),
            name: "Ada".to_string(),
            role: "reader".to_string(),
            avatar_url: None,
            bio: None,
        }
    }

    fn work(slug: &str) -> WorkData {
        WorkData {
            slug: slug.to_string(),
            title: "Solo Leveling".to_string(),
            alternative_titles: vec!["Only I Level Up".to_string()],
            description: None,
            cover_url: Some("/media/covers/abc.png".to_string()),
            status: "ongoing".to_string(),
            category_id: None,
            release_year: Some(2018),
            rating: Some(9.1),
            views: 10,
        }
    }

    fn episode(work_id: i64, number: f64) -> EpisodeData {
        EpisodeData {
            work_id,
            number,
            slug: format!("w-chapter-{number}"),
            title: None,
            image_urls: vec!["/media/chapters/1.png".to_string()],
            release_date: None,
            views: 0,
        }
    }

    #[tokio::test]
    async fn test_open_on_disk_creates_parent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("seed.sqlite");
        let store = SqliteStore::open(&path).unwrap();
        store.ping().await.unwrap();
        assert!(path.exists());
        assert_eq!(store.db_path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_user_insert_find_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_user(&user("a@x.io")).await.unwrap();

        let found = store.find_user("a@x.io").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.data.name, "Ada");

        let mut changed = user("a@x.io");
        changed.name = "Ada L".to_string();
        store.update_user(id, &changed).await.unwrap();
        assert_eq!(store.find_user("a@x.io").await.unwrap().unwrap().data.name, "Ada L");
        assert!(store.find_user("b@x.io").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_user(&user("a@x.io")).await.unwrap();
        let err = store.insert_user(&user("a@x.io")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn test_work_roundtrip_and_links() {
        let store = SqliteStore::open_in_memory().unwrap();
        let author = store.create_reference(RefKind::Author, "Chugong").await.unwrap();
        let genre = store.create_reference(RefKind::Genre, "Action").await.unwrap();
        let links = WorkLinks {
            authors: vec![author],
            artists: vec![],
            genres: vec![genre],
        };
        let id = store.insert_work(&work("solo-leveling"), &links).await.unwrap();

        let found = store.find_work("solo-leveling").await.unwrap().unwrap();
        assert_eq!(found.data.alternative_titles, vec!["Only I Level Up"]);
        assert_eq!(store.work_links(id).await.unwrap(), links);

        store
            .update_work(id, &work("solo-leveling"), &WorkLinks::default())
            .await
            .unwrap();
        assert_eq!(store.work_links(id).await.unwrap(), WorkLinks::default());
    }

    #[tokio::test]
    async fn test_failed_link_write_rolls_back_work_insert() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dangling = WorkLinks {
            authors: vec![9_999],
            ..WorkLinks::default()
        };

        let err = store.insert_work(&work("w"), &dangling).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);
        assert!(store.find_work("w").await.unwrap().is_none());

        // The same record goes in cleanly on the next attempt
        let author = store.create_reference(RefKind::Author, "Chugong").await.unwrap();
        let links = WorkLinks {
            authors: vec![author],
            ..WorkLinks::default()
        };
        let id = store.insert_work(&work("w"), &links).await.unwrap();
        assert_eq!(store.work_links(id).await.unwrap(), links);
    }

    #[tokio::test]
    async fn test_failed_link_write_rolls_back_work_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let author = store.create_reference(RefKind::Author, "Chugong").await.unwrap();
        let links = WorkLinks {
            authors: vec![author],
            ..WorkLinks::default()
        };
        let id = store.insert_work(&work("w"), &links).await.unwrap();

        let mut changed = work("w");
        changed.title = "Renamed".to_string();
        let dangling = WorkLinks {
            genres: vec![9_999],
            ..WorkLinks::default()
        };
        assert!(store.update_work(id, &changed, &dangling).await.is_err());

        let found = store.find_work("w").await.unwrap().unwrap();
        assert_eq!(found.data.title, "Solo Leveling");
        assert_eq!(store.work_links(id).await.unwrap(), links);
    }

    #[tokio::test]
    async fn test_create_reference_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_reference(RefKind::Category, "Manhwa").await.unwrap();
        let b = store.create_reference(RefKind::Category, "Manhwa").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.count_references(RefKind::Category).await.unwrap(), 1);
        assert_eq!(
            store.find_reference(RefKind::Category, "Manhwa").await.unwrap(),
            Some(a)
        );
        // Kinds do not share names
        assert!(store.find_reference(RefKind::Genre, "Manhwa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_episode_lookup_by_work_and_number() {
        let store = SqliteStore::open_in_memory().unwrap();
        let work_id = store.insert_work(&work("w"), &WorkLinks::default()).await.unwrap();
        let id = store.insert_episode(&episode(work_id, 1.5)).await.unwrap();

        let found = store.find_episode(work_id, 1.5).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.find_episode(work_id, 2.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_works_cascades() {
        let store = SqliteStore::open_in_memory().unwrap();
        let work_id = store.insert_work(&work("w"), &WorkLinks::default()).await.unwrap();
        store.insert_episode(&episode(work_id, 1.0)).await.unwrap();
        store.insert_episode(&episode(work_id, 2.0)).await.unwrap();

        assert_eq!(store.delete_all(EntityKind::Works).await.unwrap(), 1);
        assert_eq!(store.count(EntityKind::Episodes).await.unwrap(), 0);
        assert_eq!(store.count(EntityKind::Works).await.unwrap(), 0);
    }
}
