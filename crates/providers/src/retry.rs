//! Retry policy for transient LLM failures.
//!
//! Jittered exponential backoff: base 10 s, doubling per attempt, jitter
//! ±20 %, capped. Only errors the domain marks retryable (`ApiConnection`,
//! `RateLimited`, `Internal`) are retried; `InvalidRequest` fails fast.

use std::future::Future;
use std::time::Duration;

use axon_domain::error::Result;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Symmetric jitter fraction (0.2 = ±20 %).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (0-based), with jitter applied.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponential = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * 2.0 * jitter_range - jitter_range;
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Run `operation`, retrying transient failures with backoff.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once retries are exhausted. The attempt count (1-based, including
/// the first try) is reported alongside the result.
pub async fn retry_transient<F, Fut, T>(
    config: &RetryConfig,
    mut operation: F,
) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return (Ok(value), attempts),
            Err(err) => {
                if !err.is_retryable() || attempts > config.max_retries {
                    return (Err(err), attempts);
                }
                let delay = config.delay_for(attempts - 1);
                tracing::warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient LLM failure, backing off"
                );
                sleep(delay).await;
            }
        }
    }
}
