//! Thin reqwest wrapper used for media downloads.

use crate::config::{AppConfig, NetworkConfig};
use crate::error::{Result, SeedError};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// HTTP client with a fixed user agent and per-request timeout.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::MEDIA_DOWNLOAD_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| SeedError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;
        Ok(Self { client, timeout })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch a URL body. Non-success statuses become [`SeedError::MediaFetch`],
    /// retryable for 408, 429 and 5xx.
    pub async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(url, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeedError::MediaFetch {
                url: url.to_string(),
                message: format!("HTTP {}", status),
                retryable: is_retryable_status(status),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| fetch_error(url, e, self.timeout))
    }
}

fn fetch_error(url: &str, err: reqwest::Error, timeout: Duration) -> SeedError {
    if err.is_timeout() {
        return SeedError::Timeout(timeout);
    }
    SeedError::MediaFetch {
        url: url.to_string(),
        retryable: err.is_connect() || err.is_request() || err.is_body(),
        message: err.to_string(),
    }
}

/// Status codes worth another attempt.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
