//! Generic batch upserter.
//!
//! Records are split into batches of `batch_size`; batches run in input order,
//! each one to completion before the next starts. Inside a batch up to
//! `concurrency` records are in flight. Work for one natural key is serialized
//! so duplicate keys in the same batch resolve to one insert.

use super::result::{RecordOutcome, SeedResult, SKIP_ALREADY_EXISTS};
use crate::concurrency::{KeyedMutex, WorkerPool};
use crate::config::{EntityKind, PipelineConfig, SeedOptions};
use crate::error::Result;
use crate::schema::{SchemaRecord, Validated};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Placeholder id for a row a dry run would have created.
const PLANNED_ROW_ID: i64 = 0;

/// Result of looking a record up by its natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A row exists with this id.
    Existing(i64),
    Absent,
    /// The record must not be written; reported as skipped with this reason.
    Skip(String),
}

/// Entity-specific store operations driven by [`BatchUpserter`].
///
/// `insert` and `update` are never called in dry-run mode, so all side effects
/// (media uploads, reference creation) belong there rather than in `lookup`.
#[async_trait]
pub trait UpsertHandler: Send + Sync {
    type Record: SchemaRecord;

    async fn lookup(&self, record: &Self::Record) -> Result<Lookup>;
    async fn insert(&self, record: &Self::Record) -> Result<i64>;
    async fn update(&self, id: i64, record: &Self::Record) -> Result<()>;
}

/// Progress event sent after every processed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub entity: EntityKind,
    pub processed: usize,
    pub total: usize,
}

/// Drives an [`UpsertHandler`] over validated records.
pub struct BatchUpserter {
    pool: WorkerPool,
    batch_size: usize,
    dry_run: bool,
    force_overwrite: bool,
    locks: KeyedMutex<String>,
    progress: Option<mpsc::Sender<StageProgress>>,
}

impl Default for BatchUpserter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchUpserter {
    pub fn new() -> Self {
        Self {
            pool: WorkerPool::default(),
            batch_size: PipelineConfig::DEFAULT_BATCH_SIZE,
            dry_run: false,
            force_overwrite: false,
            locks: KeyedMutex::new(),
            progress: None,
        }
    }

    pub fn from_options(options: &SeedOptions) -> Self {
        Self::new()
            .with_batch_size(options.batch_size)
            .with_concurrency(options.concurrency)
            .with_dry_run(options.dry_run)
            .with_force_overwrite(options.force_overwrite)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.pool = WorkerPool::new(concurrency);
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

    /// Send [`StageProgress`] events on this channel.
    ///
    /// Events are dropped rather than awaited when the channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<StageProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Upsert every record, isolating failures per record.
    pub async fn run<H: UpsertHandler>(
        &self,
        handler: &H,
        records: Vec<Validated<H::Record>>,
    ) -> SeedResult {
        let entity = <H::Record as SchemaRecord>::ENTITY;
        let start = Instant::now();
        let total = records.len();
        let processed = AtomicUsize::new(0);
        let planned = Mutex::new(HashSet::new());
        let mut result = SeedResult::new(entity);

        info!(
            "Seeding {} {} record(s) in batches of {}{}",
            total,
            entity,
            self.batch_size,
            if self.dry_run { " (dry run)" } else { "" }
        );

        let mut remaining = records.into_iter().peekable();
        let mut batch_index = 0usize;
        while remaining.peek().is_some() {
            let batch: Vec<_> = remaining.by_ref().take(self.batch_size).collect();
            let batch_len = batch.len();

            let this = self;
            let processed = &processed;
            let planned = &planned;
            let outcomes = self
                .pool
                .run_unordered(batch, move |item| async move {
                    let key = item.record.natural_key();
                    let outcome = this.process(handler, &key, &item.record, planned).await;
                    let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    this.report(entity, done, total);
                    (key, outcome)
                })
                .await;

            for (key, outcome) in outcomes {
                result.record(key, outcome);
            }
            debug!("{} batch {} done ({} records)", entity, batch_index, batch_len);
            batch_index += 1;
        }

        result.duration = start.elapsed();
        result
    }

    async fn process<H: UpsertHandler>(
        &self,
        handler: &H,
        key: &str,
        record: &H::Record,
        planned: &Mutex<HashSet<String>>,
    ) -> RecordOutcome {
        let _guard = self.locks.lock(&key.to_string()).await;
        match self.apply(handler, key, record, planned).await {
            Ok(outcome) => outcome,
            Err(err) => RecordOutcome::Failed(err),
        }
    }

    /// `planned` holds the keys a dry run has already counted as inserted, so
    /// later records with the same key see the row the first one would create.
    async fn apply<H: UpsertHandler>(
        &self,
        handler: &H,
        key: &str,
        record: &H::Record,
        planned: &Mutex<HashSet<String>>,
    ) -> Result<RecordOutcome> {
        let mut lookup = handler.lookup(record).await?;
        if self.dry_run && lookup == Lookup::Absent {
            let mut planned = planned.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if !planned.insert(key.to_string()) {
                lookup = Lookup::Existing(PLANNED_ROW_ID);
            }
        }

        let outcome = match lookup {
            Lookup::Skip(reason) => RecordOutcome::Skipped(reason),
            Lookup::Existing(id) if self.force_overwrite => {
                if !self.dry_run {
                    handler.update(id, record).await?;
                }
                RecordOutcome::Updated
            }
            Lookup::Existing(_) => RecordOutcome::Skipped(SKIP_ALREADY_EXISTS.to_string()),
            Lookup::Absent => {
                if !self.dry_run {
                    handler.insert(record).await?;
                }
                RecordOutcome::Inserted
            }
        };
        Ok(outcome)
    }

    fn report(&self, entity: EntityKind, processed: usize, total: usize) {
        if let Some(tx) = &self.progress {
            let _ = tx.try_send(StageProgress {
                entity,
                processed,
                total,
            });
        }
    }
}
