//! Retry policy shared by every fallible platform call.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::api::PlatformError;
use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Stop,
}

/// Bounded exponential backoff over transient `PlatformError`s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.multiplier,
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the given (1-based) failed attempt, before the next one.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    pub fn should_retry(&self, attempt: u32, error: &PlatformError) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::Stop;
        }

        let mut delay = self.backoff(attempt);
        if let PlatformError::RateLimited { retry_after: Some(hint) } = error {
            delay = delay.max(*hint);
        }
        RetryDecision::Retry { delay }
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    /// Backoff waits are plain `tokio::time::sleep`s, so dropping the future cancels.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => match self.should_retry(attempt, &e) {
                    RetryDecision::Retry { delay } => {
                        warn!(
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Stop => return Err(e),
                },
            }
        }
    }
}
