//! Retry primitive: exponential delay with additive jitter, retrying only
//! errors classified transient by `SniperError::is_transient`.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{Result, SniperError};

pub const JITTER_CEILING_MS: u64 = 150;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay before the retry following attempt number `attempt` (1-based),
    /// jitter excluded. Doubles per attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op` until it succeeds, fails non-transiently, or exhausts
    /// `max_attempts`. Each wait adds jitter drawn from `[0, 150)` ms.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = op_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let wait = self.delay_for_attempt(attempt)
                        + Duration::from_millis(fastrand::u64(0..JITTER_CEILING_MS));
                    warn!(op = op_name, attempt, error = %err, ?wait, "transient failure, backing off");
                    sleep(wait).await;
                }
                Err(err) if err.is_transient() => {
                    warn!(op = op_name, attempts = self.max_attempts, error = %err, "retries exhausted");
                    return Err(SniperError::RetriesExhausted {
                        op: op_name.to_string(),
                        attempts: self.max_attempts,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Err(SniperError::RetriesExhausted {
            op: op_name.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_double_per_attempt() {
        let policy = BackoffPolicy::new(500, 5);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::new(1, 5);
        let result: Result<u32> = policy
            .run("op", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(SniperError::Timeout("later".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::new(1, 5);
        let result: Result<()> = policy
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SniperError::SimulationRejected("nope".into()))
            })
            .await;
        assert!(matches!(result, Err(SniperError::SimulationRejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_yields_retries_exhausted() {
        let policy = BackoffPolicy::new(1, 3);
        let result: Result<()> = policy
            .run("getSlot", || async { Err(SniperError::RateLimited("429".into())) })
            .await;
        match result {
            Err(SniperError::RetriesExhausted { op, attempts }) => {
                assert_eq!(op, "getSlot");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
