//! Concurrency primitives shared by the upserter, the resolver and the media
//! pipeline.
//!
//! - [`WorkerPool`]: bounded parallelism over a list of items
//! - [`SingleFlight`]: per-key memoized initialization, one creator per key
//! - [`KeyedMutex`]: per-key mutual exclusion without memoization

mod pool;
mod single_flight;

pub use pool::WorkerPool;
pub use single_flight::{KeyedGuard, KeyedMutex, SingleFlight};
