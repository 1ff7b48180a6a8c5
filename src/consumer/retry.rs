//! Bounded exponential backoff for broker connection attempts

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Retry policy with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction (0.2 = ±20%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Last failure after the policy gave up
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    pub fn new(initial_backoff: Duration, max_retries: u32) -> Self {
        Self {
            initial_backoff,
            max_retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor)
            .min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..self.jitter);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }

    /// Run `f` until it succeeds or the retry budget is spent
    pub async fn run<F, Fut, T, E>(&self, operation: &str, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut retry = 0;

        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if retry >= self.max_retries => {
                    return Err(RetryError {
                        attempts: retry + 1,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.jittered(self.backoff(retry));
                    tracing::warn!(
                        operation = operation,
                        attempt = retry + 1,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
