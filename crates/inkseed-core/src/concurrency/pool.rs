//! Bounded worker pool over async tasks.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Runs async work over a list of items with at most `concurrency` in flight.
///
/// The pool owns no threads; it drives futures on the caller's runtime, and a
/// slot is released whenever a task awaits I/O.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    /// Create a pool. A concurrency of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every item; results arrive in completion order.
    pub async fn run_unordered<T, R, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        stream::iter(items)
            .map(task)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Process every item; results keep input order.
    pub async fn run_ordered<T, R, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        stream::iter(items)
            .map(task)
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(crate::config::PipelineConfig::DEFAULT_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ordered_results_keep_input_order() {
        let pool = WorkerPool::new(3);
        let items: Vec<u64> = vec![30, 10, 20, 5];
        let results = pool
            .run_ordered(items, |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await;
        assert_eq!(results, vec![30, 10, 20, 5]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = pool
            .run_unordered((0..10).collect::<Vec<_>>(), |i| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            })
            .await;

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_zero_concurrency_becomes_one() {
        assert_eq!(WorkerPool::new(0).concurrency(), 1);
    }
}
