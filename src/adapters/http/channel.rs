//! Rate-limited request channel
//!
//! Every outbound API call goes through one shared [`RateLimitedChannel`]. It
//! spaces requests by a minimum interval, retries transient failures and trips a
//! breaker after repeated failures so a struggling upstream gets room to recover.

use crate::config::RateLimitConfig;
use crate::domain::ApiError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

/// Consecutive-failure breaker shared by all callers of a channel
///
/// Closed until `threshold` consecutive failures, then open for `reset_after`.
/// After that one probe is let through (half-open): success closes the breaker,
/// failure opens it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    reset_after: Duration,
    inner: Mutex<(BreakerState, u32)>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            threshold,
            reset_after,
            inner: Mutex::new((BreakerState::Closed, 0)),
        }
    }

    /// Refuses the call while open; moves to half-open once the reset period elapsed
    pub async fn check(&self, label: &str) -> Result<(), ApiError> {
        let mut guard = self.inner.lock().await;
        if let BreakerState::Open { since } = guard.0 {
            let elapsed = since.elapsed();
            if elapsed < self.reset_after {
                return Err(ApiError::CircuitOpen {
                    label: label.to_string(),
                    retry_in_secs: (self.reset_after - elapsed).as_secs().max(1),
                });
            }
            tracing::info!(label = %label, "Circuit breaker half-open, probing upstream");
            guard.0 = BreakerState::HalfOpen;
        }
        Ok(())
    }

    pub async fn record_success(&self) {
        let mut guard = self.inner.lock().await;
        if guard.0 != BreakerState::Closed {
            tracing::info!("Circuit breaker closed");
        }
        *guard = (BreakerState::Closed, 0);
    }

    pub async fn record_failure(&self, label: &str) {
        let mut guard = self.inner.lock().await;
        guard.1 = guard.1.saturating_add(1);
        let reopen = guard.0 == BreakerState::HalfOpen;
        if reopen || (guard.0 == BreakerState::Closed && guard.1 >= self.threshold) {
            tracing::error!(
                label = %label,
                consecutive_failures = guard.1,
                reset_secs = self.reset_after.as_secs(),
                "Circuit breaker opened"
            );
            guard.0 = BreakerState::Open {
                since: Instant::now(),
            };
        }
    }

    #[cfg(test)]
    async fn is_open(&self) -> bool {
        matches!(self.inner.lock().await.0, BreakerState::Open { .. })
    }
}

/// Shared, throttled and retrying request channel
///
/// Construct once per process and hand out `Arc<RateLimitedChannel>` clones.
#[derive(Debug)]
pub struct RateLimitedChannel {
    policy: RateLimitConfig,
    // tokio's Mutex is FIFO, so waiting callers are served in arrival order
    last_request: Mutex<Option<Instant>>,
    breaker: CircuitBreaker,
}

impl RateLimitedChannel {
    pub fn new(policy: RateLimitConfig) -> Self {
        let breaker = CircuitBreaker::new(
            policy.breaker_threshold,
            Duration::from_secs(policy.breaker_reset_seconds),
        );
        Self {
            policy,
            last_request: Mutex::new(None),
            breaker,
        }
    }

    /// Waits until `min_interval_ms` has passed since the previous request
    pub async fn throttle(&self) {
        let min_interval = Duration::from_millis(self.policy.min_interval_ms);
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Exponential backoff for the given retry attempt (1-based), without jitter
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.policy.initial_delay_ms as f64 * self.policy.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.policy.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    fn retry_delay(&self, error: &ApiError, attempt: usize) -> Duration {
        if matches!(error, ApiError::RateLimited(_)) {
            return Duration::from_millis(self.policy.throttled_delay_ms);
        }
        let jitter = if self.policy.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.policy.jitter_ms)
        } else {
            0
        };
        self.backoff_delay(attempt) + Duration::from_millis(jitter)
    }

    /// Runs `operation` through the channel
    ///
    /// Throttling applies before the first attempt only; retries are paced by
    /// their backoff. Non-retryable errors are returned immediately.
    ///
    /// # Errors
    ///
    /// `CircuitOpen` when the breaker refuses the call, the operation's own error
    /// when it is not retryable, or `RetriesExhausted` after `max_retries`.
    pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.breaker.check(label).await?;
        self.throttle().await;

        let max_retries = self.policy.max_retries;
        let mut attempt = 0usize;

        loop {
            match operation().await {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(e) => {
                    if e.counts_as_failure() {
                        self.breaker.record_failure(label).await;
                    }
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    attempt += 1;
                    if attempt > max_retries {
                        return Err(ApiError::RetriesExhausted {
                            label: label.to_string(),
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self.retry_delay(&e, attempt);
                    crate::log_retry_attempt!(
                        label,
                        attempt,
                        max_retries,
                        delay.as_millis() as u64,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    self.breaker.check(label).await?;
                }
            }
        }
    }
}
