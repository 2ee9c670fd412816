//! Bounded retry with jittered exponential backoff for upstream calls.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Relative jitter applied to each delay, e.g. 0.2 for ±20%
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powf(retry.saturating_sub(1) as f64);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }

    fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry).as_secs_f64();
        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::from_secs_f64((base * (1.0 + factor)).max(0.0))
    }
}

/// Execute an async operation, retrying transient failures.
///
/// Only errors where [`SourceError::is_transient`] holds (network failures,
/// timeouts, 5xx responses) are retried; everything else returns immediately.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!("Upstream call succeeded after {} retries", retries);
                }
                return Ok(result);
            }
            Err(error) if error.is_transient() && retries < config.max_retries => {
                retries += 1;
                let delay = config.jittered_delay(retries);
                tracing::debug!(
                    "Transient upstream error ({}), retry {}/{} in {:?}",
                    error,
                    retries,
                    config.max_retries,
                    delay
                );
                sleep(delay).await;
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(
                        "Upstream call failed after {} attempts: {}",
                        retries + 1,
                        error
                    );
                }
                return Err(error);
            }
        }
    }
}
