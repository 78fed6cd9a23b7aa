//! Inkseed CLI - seed a comics catalogue from JSON files.
//!
//! Logs go to stderr; the run report goes to stdout (as a table, or as JSON
//! with `--json`). Exits with status 1 only when the store cannot be reached.

mod args;

use anyhow::{anyhow, Context, Result};
use args::Args;
use clap::Parser;
use inkseed_core::{
    HttpClient, LocalMediaStorage, MediaMode, MediaPipeline, Orchestrator, SeedError,
    SeedOptions, SeedStore, SqliteMediaCache, SqliteStore, StageProgress,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("inkseed={0},inkseed_core={0}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn build_media(args: &Args, options: &SeedOptions) -> Result<MediaPipeline> {
    let storage = LocalMediaStorage::new(&args.media_dir).with_public_base(&args.media_base_url);
    let fetcher = HttpClient::new().context("Failed to build HTTP client")?;
    let mut pipeline = MediaPipeline::new(Arc::new(fetcher), Arc::new(storage))
        .with_mode(options.media_mode)
        .with_concurrency(options.concurrency);

    if options.media_mode == MediaMode::Skip || options.dry_run {
        return Ok(pipeline);
    }

    let cache_path = args.media_cache_path();
    match SqliteMediaCache::open(&cache_path) {
        Ok(cache) => pipeline = pipeline.with_persistent_cache(cache)?,
        Err(e) => warn!(
            "Media cache {} unavailable, continuing without it: {}",
            cache_path.display(),
            e
        ),
    }
    Ok(pipeline)
}

async fn run(args: Args) -> Result<ExitCode> {
    let options = args.seed_options().map_err(|e| anyhow!(e))?;
    let mode = args.command.mode();

    info!("Opening store {}", args.database.display());
    let store: Arc<dyn SeedStore> = match SqliteStore::open(&args.database) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Cannot connect to store {}: {}", args.database.display(), e);
            return Ok(ExitCode::from(1));
        }
    };

    let media = Arc::new(build_media(&args, &options)?);

    let (tx, mut rx) = mpsc::channel::<StageProgress>(256);
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!("{} {}/{}", event.entity, event.processed, event.total);
        }
    });

    let orchestrator = Orchestrator::new(store, media, options).with_progress(tx);
    let outcome = orchestrator.run(mode).await;
    drop(orchestrator);
    let _ = progress.await;

    match outcome {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ SeedError::FatalConnection { .. }) => {
            error!("{}", e);
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
