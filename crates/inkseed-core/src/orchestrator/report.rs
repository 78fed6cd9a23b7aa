//! Run report.

use crate::config::{EntityKind, RunMode};
use crate::media::MediaStats;
use crate::resolver::ResolverStats;
use crate::seed::{serialize_millis, SeedResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::RunState;

/// One row of the report.
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    #[serde(flatten)]
    pub result: SeedResult,
    /// Source files discovered.
    pub files: usize,
    /// Records that passed validation.
    pub valid: usize,
}

impl EntityReport {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            result: SeedResult::new(entity),
            files: 0,
            valid: 0,
        }
    }

    pub fn entity(&self) -> EntityKind {
        self.result.entity
    }
}

/// Everything a run did, produced once the store was reachable.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub dry_run: bool,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub entities: Vec<EntityReport>,
    pub media: MediaStats,
    pub resolver: ResolverStats,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl RunReport {
    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity() == kind)
    }

    pub fn total_errors(&self) -> u64 {
        self.entities.iter().map(|e| e.result.errors).sum()
    }

    pub fn total_inserted(&self) -> u64 {
        self.entities.iter().map(|e| e.result.inserted).sum()
    }
}

fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "inkseed {}{} ({}) finished in {}",
            self.mode,
            if self.dry_run { " [dry run]" } else { "" },
            self.run_id,
            secs(self.duration)
        )?;
        writeln!(
            f,
            "{:<10} {:>6} {:>6} {:>9} {:>8} {:>8} {:>7} {:>8} {:>9}",
            "entity", "files", "valid", "inserted", "updated", "skipped", "errors", "deleted", "duration"
        )?;
        for e in &self.entities {
            let r = &e.result;
            writeln!(
                f,
                "{:<10} {:>6} {:>6} {:>9} {:>8} {:>8} {:>7} {:>8} {:>9}",
                r.entity.as_str(),
                e.files,
                e.valid,
                r.inserted,
                r.updated,
                r.skipped,
                r.errors,
                r.deleted,
                secs(r.duration)
            )?;
        }

        let m = &self.media;
        writeln!(
            f,
            "media: {} uploaded, {} url hits, {} hash hits, {} downloads, {} fallbacks",
            m.uploads, m.url_hits, m.hash_hits, m.misses, m.fallbacks
        )?;
        let r = &self.resolver;
        write!(
            f,
            "references: {} created, {} memo hits, {} store lookups",
            r.created, r.hits, r.misses
        )?;

        for e in &self.entities {
            for (kind, count) in e.result.errors_by_kind() {
                write!(f, "\n  {} {}: {} error(s)", e.entity(), kind, count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::RecordOutcome;

    fn sample() -> RunReport {
        let mut users = EntityReport::new(EntityKind::Users);
        users.files = 1;
        users.valid = 2;
        users.result.record("a@x.io".into(), RecordOutcome::Inserted);
        users.result.record(
            "b@x.io".into(),
            RecordOutcome::Skipped("already exists".into()),
        );
        RunReport {
            run_id: Uuid::nil(),
            mode: RunMode::Seed,
            dry_run: false,
            state: RunState::Done,
            started_at: Utc::now(),
            entities: vec![users],
            media: MediaStats::default(),
            resolver: ResolverStats::default(),
            duration: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_display_table() {
        let text = sample().to_string();
        assert!(text.starts_with("inkseed seed"));
        let row = text.lines().find(|l| l.starts_with("users")).unwrap();
        let cols: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cols[..7], ["users", "1", "2", "1", "0", "1", "0"]);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["mode"], "seed");
        assert_eq!(json["state"], "done");
        assert_eq!(json["entities"][0]["entity"], "users");
        assert_eq!(json["entities"][0]["inserted"], 1);
        assert_eq!(json["entities"][0]["files"], 1);
        assert_eq!(json["media"]["uploads"], 0);
    }
}
