//! Centralized configuration for the seeding pipeline.
//!
//! Constants live on holder structs grouped by concern. Runtime knobs that the
//! CLI exposes are collected in [`SeedOptions`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "inkseed";
    pub const USER_AGENT: &'static str = "inkseed/0.3";
}

/// Batch and worker-pool defaults.
pub struct PipelineConfig;

impl PipelineConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const MAX_BATCH_SIZE: usize = 1_000;
    /// Kept small so storage and store collaborators are not hammered.
    pub const DEFAULT_CONCURRENCY: usize = 4;
    pub const MAX_CONCURRENCY: usize = 32;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const MEDIA_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MEDIA_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
    pub const MEDIA_RETRY_ATTEMPTS: u32 = 3;
    pub const MEDIA_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
    pub const MEDIA_RETRY_MAX_DELAY: Duration = Duration::from_secs(8);
}

/// Media relocation configuration.
pub struct MediaConfig;

impl MediaConfig {
    pub const DEFAULT_MEDIA_DIR_NAME: &'static str = "media";
    pub const DEFAULT_PUBLIC_BASE_URL: &'static str = "/media";
    pub const CACHE_FILENAME: &'static str = "media-cache.sqlite";
    pub const TEMP_SUFFIX: &'static str = ".part";
    pub const USER_AVATAR_FOLDER: &'static str = "avatars";
    pub const WORK_COVER_FOLDER: &'static str = "covers";
    pub const EPISODE_PAGE_FOLDER: &'static str = "chapters";
}

/// Store configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const DEFAULT_DATABASE_FILENAME: &'static str = "inkseed.sqlite";
    pub const BUSY_TIMEOUT_MS: u32 = 30_000;
}

/// Entity types the pipeline knows how to seed, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Users,
    Works,
    Episodes,
}

impl EntityKind {
    /// Seeding order: parents before children.
    pub const SEED_ORDER: [EntityKind; 3] =
        [EntityKind::Users, EntityKind::Works, EntityKind::Episodes];

    /// Clearing order: children before parents.
    pub const CLEAR_ORDER: [EntityKind; 3] =
        [EntityKind::Episodes, EntityKind::Works, EntityKind::Users];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Works => "works",
            EntityKind::Episodes => "episodes",
        }
    }

    /// Default glob patterns, relative to the data directory.
    pub fn default_patterns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Users => &["users.json", "users/**/*.json"],
            EntityKind::Works => &["comics.json", "comics/**/*.json", "works/**/*.json"],
            EntityKind::Episodes => &["chapters.json", "chapters/**/*.json", "episodes/**/*.json"],
        }
    }

    /// Keys under which a document may wrap its record array.
    pub fn wrapper_keys(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Users => &["users", "data", "items", "records"],
            EntityKind::Works => &["comics", "works", "data", "items", "records"],
            EntityKind::Episodes => &["chapters", "episodes", "data", "items", "records"],
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "users" | "user" => Some(EntityKind::Users),
            "works" | "work" | "comics" | "comic" => Some(EntityKind::Works),
            "episodes" | "episode" | "chapters" | "chapter" => Some(EntityKind::Episodes),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run does once the store is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Seed,
    Clear,
    Reset,
    Validate,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Seed => "seed",
            RunMode::Clear => "clear",
            RunMode::Reset => "reset",
            RunMode::Validate => "validate",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How remote media referenced by records is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Download, deduplicate and upload through the storage collaborator.
    #[default]
    Relocate,
    /// Keep the original URLs without any network I/O.
    Skip,
}

/// Runtime options for a seeding run.
#[derive(Debug, Clone)]
pub struct SeedOptions {
    /// Directory the default glob patterns are resolved against.
    pub data_dir: PathBuf,
    /// Per-entity pattern overrides. Empty means use the defaults.
    pub users_patterns: Vec<String>,
    pub works_patterns: Vec<String>,
    pub episodes_patterns: Vec<String>,
    /// Entities selected for this run.
    pub entities: Vec<EntityKind>,
    pub batch_size: usize,
    pub concurrency: usize,
    pub dry_run: bool,
    pub force_overwrite: bool,
    pub media_mode: MediaMode,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            users_patterns: Vec::new(),
            works_patterns: Vec::new(),
            episodes_patterns: Vec::new(),
            entities: EntityKind::SEED_ORDER.to_vec(),
            batch_size: PipelineConfig::DEFAULT_BATCH_SIZE,
            concurrency: PipelineConfig::DEFAULT_CONCURRENCY,
            dry_run: false,
            force_overwrite: false,
            media_mode: MediaMode::default(),
        }
    }
}

impl SeedOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_entities(mut self, entities: Vec<EntityKind>) -> Self {
        self.entities = entities;
        self
    }

    /// Batch size is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, PipelineConfig::MAX_BATCH_SIZE);
        self
    }

    /// Concurrency is clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, PipelineConfig::MAX_CONCURRENCY);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    pub fn with_media_mode(mut self, mode: MediaMode) -> Self {
        self.media_mode = mode;
        self
    }

    pub fn with_patterns(mut self, kind: EntityKind, patterns: Vec<String>) -> Self {
        match kind {
            EntityKind::Users => self.users_patterns = patterns,
            EntityKind::Works => self.works_patterns = patterns,
            EntityKind::Episodes => self.episodes_patterns = patterns,
        }
        self
    }

    /// Patterns for an entity: explicit overrides, or the defaults joined onto `data_dir`.
    pub fn patterns_for(&self, kind: EntityKind) -> Vec<String> {
        let overrides = match kind {
            EntityKind::Users => &self.users_patterns,
            EntityKind::Works => &self.works_patterns,
            EntityKind::Episodes => &self.episodes_patterns,
        };
        if !overrides.is_empty() {
            return overrides.clone();
        }
        kind.default_patterns()
            .iter()
            .map(|p| self.data_dir.join(p).to_string_lossy().into_owned())
            .collect()
    }

    /// Whether an entity is selected, keeping dependency order.
    pub fn selects(&self, kind: EntityKind) -> bool {
        self.entities.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in EntityKind::SEED_ORDER {
            assert_eq!(EntityKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_str("Chapters"), Some(EntityKind::Episodes));
        assert_eq!(EntityKind::from_str("genres"), None);
    }

    #[test]
    fn test_clear_order_is_reverse_of_seed_order() {
        let mut reversed = EntityKind::SEED_ORDER;
        reversed.reverse();
        assert_eq!(reversed, EntityKind::CLEAR_ORDER);
    }

    #[test]
    fn test_options_clamp_knobs() {
        let opts = SeedOptions::default()
            .with_batch_size(0)
            .with_concurrency(500);
        assert_eq!(opts.batch_size, 1);
        assert_eq!(opts.concurrency, PipelineConfig::MAX_CONCURRENCY);
    }

    #[test]
    fn test_patterns_default_and_override() {
        let opts = SeedOptions::new("/srv/data");
        let defaults = opts.patterns_for(EntityKind::Users);
        assert!(defaults.iter().any(|p| p.ends_with("users.json")));
        assert!(defaults.iter().all(|p| p.starts_with("/srv/data")));

        let opts = opts.with_patterns(EntityKind::Users, vec!["x/*.json".to_string()]);
        assert_eq!(opts.patterns_for(EntityKind::Users), vec!["x/*.json"]);
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(NetworkConfig::MEDIA_DOWNLOAD_TIMEOUT > Duration::ZERO);
        assert!(NetworkConfig::MEDIA_RETRY_ATTEMPTS >= 2 && NetworkConfig::MEDIA_RETRY_ATTEMPTS <= 3);
    }
}
