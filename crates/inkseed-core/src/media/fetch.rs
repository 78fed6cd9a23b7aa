//! Media download collaborator.

use crate::error::Result;
use crate::network::HttpClient;
use async_trait::async_trait;
use bytes::Bytes;

/// Downloads the bytes behind a media URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

#[async_trait]
impl MediaFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.get_bytes(url).await
    }
}
