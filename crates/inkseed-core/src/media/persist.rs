//! Persistent media dedup cache.
//!
//! Keeps the `source URL -> stored URL` and `content hash -> stored URL`
//! mappings in SQLite so later runs skip downloads and uploads they already did.

use crate::error::{Result, SeedError};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Both mappings as loaded from disk.
#[derive(Debug, Default, Clone)]
pub struct CachedMappings {
    pub by_url: Vec<(String, String)>,
    pub by_hash: Vec<(String, String)>,
}

/// SQLite-backed store for the media caches.
#[derive(Clone)]
pub struct SqliteMediaCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMediaCache {
    /// Open or create a cache database.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SeedError::Io {
                    message: format!("Failed to create cache directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| SeedError::Database {
            message: format!("Failed to open media cache: {}", e),
            source: Some(e),
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS media_by_url (
                source_url TEXT PRIMARY KEY,
                stored_url TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS media_by_hash (
                sha256 TEXT PRIMARY KEY,
                stored_url TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| SeedError::Database {
            message: format!("Failed to lock media cache: {}", e),
            source: None,
        })
    }

    /// Read every stored mapping.
    pub fn load(&self) -> Result<CachedMappings> {
        let conn = self.conn()?;
        let read = |sql: &str| -> Result<Vec<(String, String)>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        };
        let mappings = CachedMappings {
            by_url: read("SELECT source_url, stored_url FROM media_by_url")?,
            by_hash: read("SELECT sha256, stored_url FROM media_by_hash")?,
        };
        debug!(
            "Loaded media cache: {} urls, {} hashes",
            mappings.by_url.len(),
            mappings.by_hash.len()
        );
        Ok(mappings)
    }

    pub fn record_url(&self, source_url: &str, stored_url: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO media_by_url (source_url, stored_url, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![source_url, stored_url, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn record_hash(&self, sha256: &str, stored_url: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO media_by_hash (sha256, stored_url, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![sha256, stored_url, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mappings_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache").join("media.sqlite");

        {
            let cache = SqliteMediaCache::open(&path).unwrap();
            cache.record_url("https://a/1.png", "/media/covers/h.png").unwrap();
            cache.record_hash("h", "/media/covers/h.png").unwrap();
        }

        let cache = SqliteMediaCache::open(&path).unwrap();
        let loaded = cache.load().unwrap();
        assert_eq!(
            loaded.by_url,
            vec![("https://a/1.png".to_string(), "/media/covers/h.png".to_string())]
        );
        assert_eq!(loaded.by_hash.len(), 1);
    }

    #[test]
    fn test_record_replaces_existing() {
        let cache = SqliteMediaCache::open_in_memory().unwrap();
        cache.record_url("u", "old").unwrap();
        cache.record_url("u", "new").unwrap();
        assert_eq!(cache.load().unwrap().by_url, vec![("u".to_string(), "new".to_string())]);
    }
}
