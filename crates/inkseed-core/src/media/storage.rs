//! Media storage collaborator and its local-filesystem implementation.

use super::hashing::{sha256_hex, sniff_extension};
use crate::config::MediaConfig;
use crate::error::{Result, SeedError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores media bytes and returns the public URL they are served from.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn upload(&self, bytes: Bytes, folder: &str) -> Result<String>;
}

/// Content-addressed storage under a local directory.
///
/// Objects land at `<root>/<folder>/<sha256>.<ext>` and are addressed as
/// `<public_base>/<folder>/<sha256>.<ext>`. Writes go through a temp file in the
/// target directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct LocalMediaStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base: MediaConfig::DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }

    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_folder(folder: &str) -> Result<()> {
        let valid = !folder.is_empty()
            && folder.split('/').all(|part| {
                !part.is_empty()
                    && part != ".."
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            });
        if valid {
            Ok(())
        } else {
            Err(SeedError::Config {
                message: format!("Invalid media folder '{}'", folder),
            })
        }
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| SeedError::io_with_path(e, dir))?;
    if target.exists() {
        return Ok(());
    }
    let mut tmp = tempfile::Builder::new()
        .suffix(MediaConfig::TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| SeedError::io_with_path(e, dir))?;
    tmp.write_all(bytes)
        .map_err(|e| SeedError::io_with_path(e, tmp.path()))?;
    tmp.persist(target)
        .map_err(|e| SeedError::io_with_path(e.error, target))?;
    Ok(())
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn upload(&self, bytes: Bytes, folder: &str) -> Result<String> {
        Self::check_folder(folder)?;

        let file_name = format!("{}.{}", sha256_hex(&bytes), sniff_extension(&bytes));
        let dir = self.root.join(folder);
        let target = dir.join(&file_name);

        let write_target = target.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &write_target, &bytes))
            .await
            .map_err(|e| SeedError::Other(format!("Storage task failed: {}", e)))?
            .map_err(|e| SeedError::MediaUpload {
                url: target.display().to_string(),
                message: e.to_string(),
            })?;

        debug!("Stored {}", target.display());
        Ok(format!("{}/{}/{}", self.public_base, folder, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_is_content_addressed() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalMediaStorage::new(tmp.path()).with_public_base("https://cdn.test/");

        let png = Bytes::from_static(b"\x89PNG\r\n\x1a\nbody");
        let url = storage.upload(png.clone(), "covers").await.unwrap();
        let hash = sha256_hex(&png);

        assert_eq!(url, format!("https://cdn.test/covers/{}.png", hash));
        let on_disk = tmp.path().join("covers").join(format!("{}.png", hash));
        assert_eq!(std::fs::read(on_disk).unwrap(), png.to_vec());

        // Same bytes again resolve to the same object
        assert_eq!(storage.upload(png, "covers").await.unwrap(), url);
        let entries = std::fs::read_dir(tmp.path().join("covers")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_rejects_escaping_folder() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalMediaStorage::new(tmp.path());
        assert!(storage.upload(Bytes::from_static(b"x"), "../etc").await.is_err());
        assert!(storage.upload(Bytes::from_static(b"x"), "").await.is_err());
        assert!(storage
            .upload(Bytes::from_static(b"x"), "chapters/solo-leveling")
            .await
            .is_ok());
    }
}
