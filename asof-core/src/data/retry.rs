//! Bounded retry with exponential backoff and jitter.

use crate::error::ProviderError;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..0.25);
            delay.mul_f64(1.0 + extra).min(self.max_delay)
        } else {
            delay
        }
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    /// Rate-limit responses wait at least their `retry_after`, up to `max_delay`.
    /// Returns the final result and the number of attempts made.
    pub fn run<T, F>(&self, mut op: F) -> (Result<T, ProviderError>, u32)
    where
        F: FnMut(u32) -> Result<T, ProviderError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt) {
                Ok(v) => return (Ok(v), attempt),
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    let mut delay = self.backoff(attempt);
                    if let ProviderError::RateLimited { retry_after_secs } = e {
                        delay = delay.max(Duration::from_secs(retry_after_secs).min(self.max_delay));
                    }
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider error, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}
