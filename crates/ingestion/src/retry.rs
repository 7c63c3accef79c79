//! Request pacing and retry.

use holdings_core::config::{RetryConfig, MIN_REQUESTS_PER_SECOND};
use holdings_core::{Error, Result};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    max_attempts: u32,
    /// Wait after the first failure; doubles after each further failure.
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a new policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Create a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the given failed attempt (1-based): base, 2*base, 4*base, ...
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or attempts run out.
    ///
    /// Returns the last error on exhaustion.
    pub async fn attempt<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        target_label = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Spaces requests evenly so no more than `rate` start per second.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter for `requests_per_second`; rates slower than one
    /// request per hour are rejected.
    pub fn new(requests_per_second: f64) -> Result<Self> {
        if requests_per_second.is_nan() || requests_per_second < MIN_REQUESTS_PER_SECOND {
            return Err(Error::config(format!(
                "request rate {requests_per_second}/s is below {MIN_REQUESTS_PER_SECOND}/s"
            )));
        }
        let interval = Duration::try_from_secs_f64(1.0 / requests_per_second)
            .map_err(|e| Error::config(format!("request rate {requests_per_second}/s: {e}")))?;
        Ok(Self {
            interval,
            next_slot: Mutex::new(None),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next request slot.
    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().unwrap_or_else(|p| p.into_inner());
            let now = Instant::now();
            let slot = next.map_or(now, |s| s.max(now));
            *next = Some(slot + self.interval);
            slot - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
