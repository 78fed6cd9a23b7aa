//! Seeding stages.
//!
//! [`BatchUpserter`] owns batching, concurrency, dry-run and overwrite policy.
//! Each entity plugs in an [`UpsertHandler`] that knows how to look up, insert
//! and update its rows.

mod episodes;
mod result;
mod upserter;
mod users;
mod works;

pub use episodes::EpisodeHandler;
pub use result::{
    RecordFailure, RecordOutcome, SeedResult, SkippedRecord, SKIP_ALREADY_EXISTS,
    SKIP_PARENT_NOT_FOUND,
};
pub use upserter::{BatchUpserter, Lookup, StageProgress, UpsertHandler};
pub use users::UserHandler;
pub use works::WorkHandler;

pub(crate) use result::serialize_millis;
