//! Media relocation: download, hash, dedup, upload.

use super::cache::{Counters, MediaCache, MediaStats};
use super::fetch::MediaFetcher;
use super::hashing::sha256_hex;
use super::persist::SqliteMediaCache;
use super::storage::MediaStorage;
use crate::concurrency::WorkerPool;
use crate::config::{MediaMode, NetworkConfig};
use crate::error::{Result, SeedError};
use crate::network::{retry_async, RetryPolicy};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Whether a value points at something we can download.
fn is_remote(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}

/// Relocates remote media into the storage collaborator.
///
/// Every failure degrades to the original URL: relocation never fails a record.
pub struct MediaPipeline {
    fetcher: Arc<dyn MediaFetcher>,
    storage: Arc<dyn MediaStorage>,
    cache: MediaCache,
    persistent: Option<SqliteMediaCache>,
    mode: MediaMode,
    pool: WorkerPool,
    retry: RetryPolicy,
    download_timeout: Duration,
    upload_timeout: Duration,
}

impl MediaPipeline {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, storage: Arc<dyn MediaStorage>) -> Self {
        Self {
            fetcher,
            storage,
            cache: MediaCache::new(),
            persistent: None,
            mode: MediaMode::default(),
            pool: WorkerPool::default(),
            retry: RetryPolicy::media(),
            download_timeout: NetworkConfig::MEDIA_DOWNLOAD_TIMEOUT,
            upload_timeout: NetworkConfig::MEDIA_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_mode(mut self, mode: MediaMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.pool = WorkerPool::new(concurrency);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, download: Duration, upload: Duration) -> Self {
        self.download_timeout = download;
        self.upload_timeout = upload;
        self
    }

    /// Load mappings from a persistent cache and write new ones through to it.
    pub fn with_persistent_cache(mut self, persistent: SqliteMediaCache) -> Result<Self> {
        self.cache.preload(persistent.load()?);
        self.persistent = Some(persistent);
        Ok(self)
    }

    pub fn mode(&self) -> MediaMode {
        self.mode
    }

    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }

    pub fn stats(&self) -> MediaStats {
        self.cache.stats()
    }

    /// Relocate one URL into `folder`, returning the stored URL or the original
    /// on failure. Values that are not http(s) URLs are returned unchanged.
    pub async fn relocate(&self, url: &str, folder: &str) -> String {
        let url = url.trim();
        if self.mode == MediaMode::Skip || !is_remote(url) {
            return url.to_string();
        }

        let counters = &self.cache.counters;
        if let Some(stored) = self.cache.stored_for_url(url) {
            Counters::bump(&counters.url_hits);
            debug!("Media cache hit for {}", url);
            return stored;
        }

        let result = self
            .cache
            .by_url
            .get_or_try_init(url.to_string(), || self.fetch_and_store(url, folder))
            .await;

        match result {
            Ok((stored, initialized_here)) => {
                if !initialized_here {
                    Counters::bump(&counters.url_hits);
                } else {
                    self.persist(|p| p.record_url(url, &stored));
                }
                stored
            }
            Err(e) => {
                Counters::bump(&counters.fallbacks);
                warn!("Keeping original media URL {}: {}", url, e);
                url.to_string()
            }
        }
    }

    /// Relocate an optional value; blank values yield `None`.
    pub async fn relocate_opt(&self, url: Option<&str>, folder: &str) -> Option<String> {
        match url.map(str::trim) {
            Some(u) if !u.is_empty() => Some(self.relocate(u, folder).await),
            _ => None,
        }
    }

    /// Relocate a list through the worker pool, keeping input order and
    /// dropping blank entries.
    pub async fn relocate_all(&self, urls: &[String], folder: &str) -> Vec<String> {
        let items: Vec<String> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        let this = self;
        self.pool
            .run_ordered(items, move |u| async move { this.relocate(&u, folder).await })
            .await
    }

    async fn fetch_and_store(&self, url: &str, folder: &str) -> Result<String> {
        Counters::bump(&self.cache.counters.misses);
        let bytes = self.download(url).await?;
        let hash = sha256_hex(&bytes);

        let storage = &self.storage;
        let upload_timeout = self.upload_timeout;
        let (stored, uploaded_here) = self
            .cache
            .by_hash
            .get_or_try_init(hash.clone(), || async move {
                match tokio::time::timeout(upload_timeout, storage.upload(bytes, folder)).await {
                    Ok(Ok(stored)) => Ok(stored),
                    Ok(Err(e)) => Err(SeedError::MediaUpload {
                        url: url.to_string(),
                        message: e.to_string(),
                    }),
                    Err(_) => Err(SeedError::MediaUpload {
                        url: url.to_string(),
                        message: format!("upload timed out after {:?}", upload_timeout),
                    }),
                }
            })
            .await?;

        if uploaded_here {
            Counters::bump(&self.cache.counters.uploads);
            self.persist(|p| p.record_hash(&hash, &stored));
            debug!("Uploaded {} as {}", url, stored);
        } else {
            Counters::bump(&self.cache.counters.hash_hits);
            debug!("Content of {} already stored as {}", url, stored);
        }
        Ok(stored)
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        let fetcher = &self.fetcher;
        let timeout = self.download_timeout;
        let (result, stats) = retry_async(
            &self.retry,
            || async move {
                match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
                    Ok(result) => result,
                    Err(_) => Err(SeedError::Timeout(timeout)),
                }
            },
            SeedError::is_retryable,
        )
        .await;

        result.map_err(|e| match e {
            SeedError::MediaFetch { .. } => e,
            other => SeedError::MediaFetch {
                url: url.to_string(),
                message: format!("{} (after {} attempts)", other, stats.attempts),
                retryable: false,
            },
        })
    }

    fn persist(&self, write: impl FnOnce(&SqliteMediaCache) -> Result<()>) {
        if let Some(persistent) = &self.persistent {
            if let Err(e) = write(persistent) {
                warn!("Failed to persist media mapping: {}", e);
            }
        }
    }
}
