//! Run orchestration.
//!
//! A run moves through `Init -> Connecting -> {Clearing, Seeding, Validating}
//! -> Reporting -> Done`. Only a failure while connecting ends in `Failed`;
//! every later error is recorded against the entity it happened in.

mod report;

pub use report::{EntityReport, RunReport};

use crate::config::{EntityKind, RunMode, SeedOptions};
use crate::discovery::SourceDiscoverer;
use crate::error::{Result, SeedError};
use crate::media::MediaPipeline;
use crate::resolver::RelationshipResolver;
use crate::schema::{load_files, EpisodeRecord, SchemaRecord, UserRecord, WorkRecord};
use crate::seed::{
    BatchUpserter, EpisodeHandler, RecordOutcome, StageProgress, UpsertHandler, UserHandler,
    WorkHandler,
};
use crate::store::SeedStore;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Init,
    Connecting,
    Clearing,
    Seeding,
    Validating,
    Reporting,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::Connecting => "connecting",
            RunState::Clearing => "clearing",
            RunState::Seeding => "seeding",
            RunState::Validating => "validating",
            RunState::Reporting => "reporting",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct StateMachine {
    state: RunState,
}

impl StateMachine {
    fn enter(&mut self, next: RunState) {
        debug!("Run state {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Sequences the stages of a run against one store.
pub struct Orchestrator {
    store: Arc<dyn SeedStore>,
    media: Arc<MediaPipeline>,
    options: SeedOptions,
    discoverer: SourceDiscoverer,
    progress: Option<mpsc::Sender<StageProgress>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn SeedStore>, media: Arc<MediaPipeline>, options: SeedOptions) -> Self {
        Self {
            store,
            media,
            options,
            discoverer: SourceDiscoverer::new(),
            progress: None,
        }
    }

    pub fn with_discoverer(mut self, discoverer: SourceDiscoverer) -> Self {
        self.discoverer = discoverer;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<StageProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn options(&self) -> &SeedOptions {
        &self.options
    }

    /// Execute a run.
    ///
    /// Returns [`SeedError::FatalConnection`] if the store cannot be reached;
    /// otherwise always returns a report, whatever happened to individual records.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let mut machine = StateMachine {
            state: RunState::Init,
        };
        info!("Starting {} run {}", mode, run_id);

        machine.enter(RunState::Connecting);
        if let Err(e) = self.store.ping().await {
            machine.enter(RunState::Failed);
            error!("Cannot reach store: {}", e);
            return Err(SeedError::FatalConnection {
                message: e.to_string(),
            });
        }

        let resolver = Arc::new(RelationshipResolver::new(self.store.clone()));
        let entities = match mode {
            RunMode::Seed => {
                machine.enter(RunState::Seeding);
                self.seed(&resolver).await
            }
            RunMode::Clear => {
                machine.enter(RunState::Clearing);
                self.clear().await
            }
            RunMode::Reset => {
                machine.enter(RunState::Clearing);
                let cleared = self.clear().await;
                machine.enter(RunState::Seeding);
                let mut seeded = self.seed(&resolver).await;
                for report in &mut seeded {
                    if let Some(c) = cleared.iter().find(|c| c.entity() == report.entity()) {
                        report.result.deleted = c.result.deleted;
                        for failure in &c.result.failures {
                            report.result.errors += 1;
                            report.result.failures.push(failure.clone());
                        }
                    }
                }
                seeded
            }
            RunMode::Validate => {
                machine.enter(RunState::Validating);
                self.validate()
            }
        };

        machine.enter(RunState::Reporting);
        let mut report = RunReport {
            run_id,
            mode,
            dry_run: self.options.dry_run,
            state: RunState::Done,
            started_at,
            entities,
            media: self.media.stats(),
            resolver: resolver.stats(),
            duration: start.elapsed(),
        };
        machine.enter(RunState::Done);
        report.state = machine.state;

        info!(
            "Finished {} run in {:.2}s: {} inserted, {} error(s)",
            mode,
            report.duration.as_secs_f64(),
            report.total_inserted(),
            report.total_errors()
        );
        Ok(report)
    }

    fn selected(&self, order: [EntityKind; 3]) -> impl Iterator<Item = EntityKind> + '_ {
        order.into_iter().filter(|kind| self.options.selects(*kind))
    }

    fn discover(&self, kind: EntityKind, report: &mut EntityReport) -> Vec<PathBuf> {
        match self.discoverer.discover(&self.options.patterns_for(kind)) {
            Ok(files) => {
                report.files = files.len();
                files
            }
            Err(e) => {
                report
                    .result
                    .record(format!("{} patterns", kind), RecordOutcome::Failed(e));
                Vec::new()
            }
        }
    }

    async fn seed(&self, resolver: &Arc<RelationshipResolver>) -> Vec<EntityReport> {
        let mut upserter = BatchUpserter::from_options(&self.options);
        if let Some(tx) = &self.progress {
            upserter = upserter.with_progress(tx.clone());
        }

        let mut reports = Vec::new();
        // Stages run strictly one after another: works need users, episodes need works
        for kind in self.selected(EntityKind::SEED_ORDER) {
            info!("Seeding {}", kind);
            let report = match kind {
                EntityKind::Users => {
                    let handler = UserHandler::new(self.store.clone(), self.media.clone());
                    self.seed_stage(&upserter, &handler).await
                }
                EntityKind::Works => {
                    let handler =
                        WorkHandler::new(self.store.clone(), resolver.clone(), self.media.clone());
                    self.seed_stage(&upserter, &handler).await
                }
                EntityKind::Episodes => {
                    let handler = EpisodeHandler::new(self.store.clone(), self.media.clone());
                    self.seed_stage(&upserter, &handler).await
                }
            };
            let r = &report.result;
            info!(
                "{}: {} inserted, {} updated, {} skipped, {} error(s)",
                kind, r.inserted, r.updated, r.skipped, r.errors
            );
            reports.push(report);
        }
        reports
    }

    async fn seed_stage<H: UpsertHandler>(&self, upserter: &BatchUpserter, handler: &H) -> EntityReport {
        let kind = <H::Record as SchemaRecord>::ENTITY;
        let start = Instant::now();
        let mut report = EntityReport::new(kind);

        let files = self.discover(kind, &mut report);
        let outcome = load_files::<H::Record>(&files);
        report.valid = outcome.records.len();

        let discovery_failures = std::mem::take(&mut report.result.failures);
        let mut result = upserter.run(handler, outcome.records).await;
        result.record_rejections(&outcome.rejected);
        result.errors += discovery_failures.len() as u64;
        result.failures.extend(discovery_failures);
        result.duration = start.elapsed();

        report.result = result;
        report
    }

    async fn clear(&self) -> Vec<EntityReport> {
        let mut reports = Vec::new();
        for kind in self.selected(EntityKind::CLEAR_ORDER) {
            let start = Instant::now();
            let mut report = EntityReport::new(kind);
            let outcome = if self.options.dry_run {
                self.store.count(kind).await
            } else {
                self.store.delete_all(kind).await
            };
            match outcome {
                Ok(n) => {
                    info!("Cleared {} {}{}", n, kind, if self.options.dry_run { " (dry run)" } else { "" });
                    report.result.deleted = n;
                }
                Err(e) => report.result.record(kind.to_string(), RecordOutcome::Failed(e)),
            }
            report.result.duration = start.elapsed();
            reports.push(report);
        }
        reports
    }

    fn validate(&self) -> Vec<EntityReport> {
        let mut reports = Vec::new();
        for kind in self.selected(EntityKind::SEED_ORDER) {
            let start = Instant::now();
            let mut report = EntityReport::new(kind);
            let files = self.discover(kind, &mut report);
            let (valid, rejected) = match kind {
                EntityKind::Users => Self::check::<UserRecord>(&files),
                EntityKind::Works => Self::check::<WorkRecord>(&files),
                EntityKind::Episodes => Self::check::<EpisodeRecord>(&files),
            };
            report.valid = valid;
            report.result.record_rejections(&rejected);
            report.result.duration = start.elapsed();
            info!("{}: {} valid, {} rejected", kind, valid, rejected.len());
            reports.push(report);
        }
        reports
    }

    fn check<T: SchemaRecord>(files: &[PathBuf]) -> (usize, Vec<crate::schema::RejectedRecord>) {
        let outcome = load_files::<T>(files);
        (outcome.records.len(), outcome.rejected)
    }
}
