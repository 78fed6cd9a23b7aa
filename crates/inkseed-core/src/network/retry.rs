//! Bounded retry with exponential backoff and jitter.

use crate::config::NetworkConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Scale each delay by a random factor in `0.5..1.5`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::media()
    }
}

impl RetryPolicy {
    /// Policy used for media downloads.
    pub fn media() -> Self {
        Self {
            max_attempts: NetworkConfig::MEDIA_RETRY_ATTEMPTS,
            base_delay: NetworkConfig::MEDIA_RETRY_BASE_DELAY,
            max_delay: NetworkConfig::MEDIA_RETRY_MAX_DELAY,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::media()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before retrying after failed attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let mut secs = raw.min(max);
        if self.jitter {
            secs = (secs * rand::rng().random_range(0.5..1.5)).min(max);
        }
        Duration::from_secs_f64(secs)
    }
}

/// What happened across the attempts of one operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
pub async fn retry_async<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let max_attempts = policy.max_attempts.max(1);

    loop {
        let attempt = stats.attempts;
        stats.attempts += 1;

        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Succeeded on attempt {}", stats.attempts);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };

        if !is_retryable(&err) {
            debug!("Not retrying: {}", err);
            return (Err(err), stats);
        }
        if stats.attempts >= max_attempts {
            warn!("Giving up after {} attempts: {}", stats.attempts, err);
            return (Err(err), stats);
        }

        let delay = policy.delay_for(attempt);
        stats.total_delay += delay;
        debug!(
            "Attempt {}/{} failed: {}; retrying in {:?}",
            stats.attempts, max_attempts, err, delay
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::media().with_jitter(false);
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(10), NetworkConfig::MEDIA_RETRY_MAX_DELAY);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::media();
        for _ in 0..50 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (result, stats) = retry_async(
            &RetryPolicy::media(),
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("reset by peer")
                } else {
                    Ok(7)
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(stats.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_permanent_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (result, stats) = retry_async(
            &RetryPolicy::media(),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("404")
            },
            |e: &&str| *e != "404",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.total_delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let (result, stats) = retry_async(
            &RetryPolicy::media().with_max_attempts(3),
            || async { Err::<(), _>("503") },
            |_| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(stats.attempts, 3);
    }
}
