//! Command-line arguments.

use clap::{ArgAction, Parser, Subcommand};
use inkseed_core::config::{MediaConfig, PipelineConfig, StoreConfig};
use inkseed_core::{EntityKind, MediaMode, RunMode, SeedOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inkseed")]
#[command(version)]
#[command(about = "Seed users, comics and chapters from JSON files")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Entities to process: users, works, episodes or all (comma separated)
    #[arg(long, global = true, value_delimiter = ',', default_value = "all")]
    pub entities: Vec<String>,

    /// Report what would happen without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Update rows that already exist instead of skipping them
    #[arg(long, global = true)]
    pub force: bool,

    /// Records per batch
    #[arg(long, global = true, default_value_t = PipelineConfig::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Records (and downloads) in flight at once
    #[arg(long, global = true, default_value_t = PipelineConfig::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Directory the default file patterns are resolved against
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Glob pattern(s) for user files, replacing the defaults
    #[arg(long = "users", global = true, value_name = "GLOB")]
    pub users_patterns: Vec<String>,

    /// Glob pattern(s) for work files, replacing the defaults
    #[arg(long = "works", global = true, value_name = "GLOB")]
    pub works_patterns: Vec<String>,

    /// Glob pattern(s) for episode files, replacing the defaults
    #[arg(long = "episodes", global = true, value_name = "GLOB")]
    pub episodes_patterns: Vec<String>,

    /// SQLite database to seed
    #[arg(long, global = true, default_value = StoreConfig::DEFAULT_DATABASE_FILENAME)]
    pub database: PathBuf,

    /// Directory relocated media is written to
    #[arg(long, global = true, default_value = MediaConfig::DEFAULT_MEDIA_DIR_NAME)]
    pub media_dir: PathBuf,

    /// Public URL prefix for relocated media
    #[arg(long, global = true, default_value = MediaConfig::DEFAULT_PUBLIC_BASE_URL)]
    pub media_base_url: String,

    /// Persistent media cache (defaults to a file inside the media directory)
    #[arg(long, global = true)]
    pub media_cache: Option<PathBuf>,

    /// Keep original media URLs; no downloads or uploads
    #[arg(long, global = true)]
    pub skip_media: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the run report as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Insert records that do not exist yet
    Seed,
    /// Delete seeded rows, children first
    Clear,
    /// Clear, then seed
    Reset,
    /// Discover and validate files without touching the store
    Validate,
}

impl Command {
    pub fn mode(&self) -> RunMode {
        match self {
            Command::Seed => RunMode::Seed,
            Command::Clear => RunMode::Clear,
            Command::Reset => RunMode::Reset,
            Command::Validate => RunMode::Validate,
        }
    }
}

/// Parse `--entities`, keeping dependency order.
pub fn parse_entities(values: &[String]) -> Result<Vec<EntityKind>, String> {
    let mut selected = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value.eq_ignore_ascii_case("all") {
            return Ok(EntityKind::SEED_ORDER.to_vec());
        }
        let kind = EntityKind::from_str(value).ok_or_else(|| {
            format!("unknown entity '{}' (expected users, works, episodes or all)", value)
        })?;
        if !selected.contains(&kind) {
            selected.push(kind);
        }
    }
    if selected.is_empty() {
        return Ok(EntityKind::SEED_ORDER.to_vec());
    }
    selected.sort();
    Ok(selected)
}

impl Args {
    pub fn seed_options(&self) -> Result<SeedOptions, String> {
        let media_mode = if self.skip_media {
            MediaMode::Skip
        } else {
            MediaMode::Relocate
        };
        Ok(SeedOptions::new(&self.data_dir)
            .with_entities(parse_entities(&self.entities)?)
            .with_batch_size(self.batch_size)
            .with_concurrency(self.concurrency)
            .with_dry_run(self.dry_run)
            .with_force_overwrite(self.force)
            .with_media_mode(media_mode)
            .with_patterns(EntityKind::Users, self.users_patterns.clone())
            .with_patterns(EntityKind::Works, self.works_patterns.clone())
            .with_patterns(EntityKind::Episodes, self.episodes_patterns.clone()))
    }

    pub fn media_cache_path(&self) -> PathBuf {
        self.media_cache
            .clone()
            .unwrap_or_else(|| self.media_dir.join(MediaConfig::CACHE_FILENAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("inkseed").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["seed"]);
        assert_eq!(args.command, Command::Seed);
        let opts = args.seed_options().unwrap();
        assert_eq!(opts.entities, EntityKind::SEED_ORDER.to_vec());
        assert_eq!(opts.batch_size, PipelineConfig::DEFAULT_BATCH_SIZE);
        assert_eq!(opts.media_mode, MediaMode::Relocate);
        assert!(!opts.dry_run);
    }

    #[test]
    fn test_flags_after_subcommand() {
        let args = parse(&[
            "reset",
            "--entities",
            "episodes,users",
            "--dry-run",
            "--force",
            "--skip-media",
            "--batch-size",
            "10",
            "-vv",
        ]);
        assert_eq!(args.command.mode(), RunMode::Reset);
        assert_eq!(args.verbose, 2);
        let opts = args.seed_options().unwrap();
        assert_eq!(opts.entities, vec![EntityKind::Users, EntityKind::Episodes]);
        assert!(opts.dry_run && opts.force_overwrite);
        assert_eq!(opts.media_mode, MediaMode::Skip);
        assert_eq!(opts.batch_size, 10);
    }

    #[test]
    fn test_pattern_overrides() {
        let args = parse(&["seed", "--works", "fixtures/*.json", "--works", "more/**/*.json"]);
        let opts = args.seed_options().unwrap();
        assert_eq!(
            opts.patterns_for(EntityKind::Works),
            vec!["fixtures/*.json", "more/**/*.json"]
        );
    }

    #[test]
    fn test_unknown_entity_is_rejected() {
        let args = parse(&["seed", "--entities", "genres"]);
        assert!(args.seed_options().is_err());
    }

    #[test]
    fn test_parse_entities_aliases() {
        let values = vec!["chapters".to_string(), "comics".to_string()];
        assert_eq!(
            parse_entities(&values).unwrap(),
            vec![EntityKind::Works, EntityKind::Episodes]
        );
    }

    #[test]
    fn test_media_cache_default_lives_in_media_dir() {
        let args = parse(&["seed", "--media-dir", "/srv/media"]);
        assert_eq!(
            args.media_cache_path(),
            PathBuf::from("/srv/media").join(MediaConfig::CACHE_FILENAME)
        );
    }
}
