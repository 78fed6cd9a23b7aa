//! Per-entity seeding results.

use crate::config::EntityKind;
use crate::error::{ErrorKind, SeedError};
use crate::schema::RejectedRecord;
use serde::{Serialize, Serializer};
use std::time::Duration;
use tracing::{info, warn};

/// Skip reason for a record whose natural key already exists.
pub const SKIP_ALREADY_EXISTS: &str = "already exists";
/// Skip reason for a child record whose parent is not in the store.
pub const SKIP_PARENT_NOT_FOUND: &str = "parent not found";

/// What happened to a single record.
#[derive(Debug)]
pub enum RecordOutcome {
    Inserted,
    Updated,
    Skipped(String),
    Failed(SeedError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
}

pub(crate) fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Counters and details for one entity stage.
#[derive(Debug, Clone, Serialize)]
pub struct SeedResult {
    pub entity: EntityKind,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Rows removed (clear and reset modes).
    pub deleted: u64,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub skipped_records: Vec<SkippedRecord>,
    pub failures: Vec<RecordFailure>,
}

impl SeedResult {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            inserted: 0,
            updated: 0,
            skipped: 0,
            errors: 0,
            deleted: 0,
            duration: Duration::ZERO,
            skipped_records: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Records that reached the upserter or were rejected before it.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.skipped + self.errors
    }

    pub fn record(&mut self, key: String, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Inserted => self.inserted += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Skipped(reason) => {
                info!("Skipped {} {}: {}", self.entity, key, reason);
                self.skipped += 1;
                self.skipped_records.push(SkippedRecord { key, reason });
            }
            RecordOutcome::Failed(err) => {
                warn!("Failed {} {}: {}", self.entity, key, err);
                self.errors += 1;
                self.failures.push(RecordFailure {
                    key,
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Count records rejected during validation as errors.
    pub fn record_rejections(&mut self, rejected: &[RejectedRecord]) {
        for r in rejected {
            self.errors += 1;
            self.failures.push(RecordFailure {
                key: r.origin.clone(),
                kind: ErrorKind::Validation,
                message: r.message.clone(),
            });
        }
    }

    /// Errors grouped by kind, in first-seen order.
    pub fn errors_by_kind(&self) -> Vec<(ErrorKind, u64)> {
        let mut grouped: Vec<(ErrorKind, u64)> = Vec::new();
        for f in &self.failures {
            match grouped.iter_mut().find(|(k, _)| *k == f.kind) {
                Some((_, n)) => *n += 1,
                None => grouped.push((f.kind, 1)),
            }
        }
        grouped
    }
}
