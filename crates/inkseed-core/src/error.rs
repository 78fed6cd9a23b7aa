//! Error types for the inkseed pipeline.
//!
//! Every variant except [`SeedError::FatalConnection`] is recoverable: the layer
//! that observes it converts it into a counter and a log line. Only a store that
//! cannot be reached while connecting is allowed to abort a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the seeding pipeline.
#[derive(Debug, Error)]
pub enum SeedError {
    // Record-level errors
    #[error("Validation error in {record}: {message}")]
    Validation { record: String, message: String },

    #[error("Failed to resolve {kind} '{name}': {message}")]
    RelationshipResolution {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Failed to fetch media {url}: {message}")]
    MediaFetch {
        url: String,
        message: String,
        /// Whether the failure is transient (5xx, 429, connection reset).
        retryable: bool,
    },

    #[error("Failed to upload media {url}: {message}")]
    MediaUpload { url: String, message: String },

    #[error("Failed to persist {key}: {message}")]
    Persistence { key: String, message: String },

    // Run-level errors
    #[error("Cannot connect to store: {message}")]
    FatalConnection { message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for seeding operations.
pub type Result<T> = std::result::Result<T, SeedError>;

/// Stable classification of errors used in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    RelationshipResolution,
    MediaFetch,
    MediaUpload,
    Persistence,
    FatalConnection,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::RelationshipResolution => "relationship_resolution",
            ErrorKind::MediaFetch => "media_fetch",
            ErrorKind::MediaUpload => "media_upload",
            ErrorKind::Persistence => "persistence",
            ErrorKind::FatalConnection => "fatal_connection",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<std::io::Error> for SeedError {
    fn from(err: std::io::Error) -> Self {
        SeedError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SeedError {
    fn from(err: serde_json::Error) -> Self {
        SeedError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for SeedError {
    fn from(err: rusqlite::Error) -> Self {
        SeedError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Timeouts stay `Network` here since the configured duration is unknown;
/// [`crate::network::HttpClient`] maps them to [`SeedError::Timeout`] itself.
impl From<reqwest::Error> for SeedError {
    fn from(err: reqwest::Error) -> Self {
        SeedError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SeedError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SeedError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a record.
    pub fn validation(record: impl Into<String>, message: impl Into<String>) -> Self {
        SeedError::Validation {
            record: record.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error for a natural key.
    pub fn persistence(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        SeedError::Persistence {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Classify the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SeedError::Validation { .. } | SeedError::Json { .. } => ErrorKind::Validation,
            SeedError::RelationshipResolution { .. } => ErrorKind::RelationshipResolution,
            SeedError::MediaFetch { .. } | SeedError::Network { .. } | SeedError::Timeout(_) => {
                ErrorKind::MediaFetch
            }
            SeedError::MediaUpload { .. } => ErrorKind::MediaUpload,
            SeedError::Persistence { .. } | SeedError::Database { .. } => ErrorKind::Persistence,
            SeedError::FatalConnection { .. } => ErrorKind::FatalConnection,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SeedError::Network { .. }
                | SeedError::Timeout(_)
                | SeedError::MediaFetch {
                    retryable: true,
                    ..
                }
        )
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SeedError::FatalConnection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SeedError::validation("users.json#3", "missing email");
        assert_eq!(
            err.to_string(),
            "Validation error in users.json#3: missing email"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SeedError::persistence("slug:a", "constraint failed").kind(),
            ErrorKind::Persistence
        );
        assert_eq!(
            SeedError::FatalConnection {
                message: "refused".into()
            }
            .kind(),
            ErrorKind::FatalConnection
        );
        assert_eq!(SeedError::Other("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SeedError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(SeedError::MediaFetch {
            url: "https://cdn/a.png".into(),
            message: "status 503".into(),
            retryable: true,
        }
        .is_retryable());
        assert!(!SeedError::MediaFetch {
            url: "https://cdn/a.png".into(),
            message: "status 404".into(),
            retryable: false,
        }
        .is_retryable());
        assert!(!SeedError::validation("r", "m").is_retryable());
    }

    #[test]
    fn test_only_connection_errors_are_fatal() {
        assert!(SeedError::FatalConnection {
            message: "down".into()
        }
        .is_fatal());
        assert!(!SeedError::persistence("k", "m").is_fatal());
    }
}
