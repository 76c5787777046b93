//! Automatic retry with exponential backoff and jitter.
//!
//! Retries transient model failures (timeouts, 429, 5xx, dropped connections)
//! with configurable exponential backoff. Permanent failures (400, 401, 403,
//! unparseable responses) fail immediately. Each attempt runs under its own
//! bounded wait; an attempt that exceeds it counts as a transient failure.

use crate::error::ModelInvocationError;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = a single attempt).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries. Uses default delays.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// No waiting between attempts. Useful in tests.
    pub fn immediate(retries: u32) -> Self {
        Self {
            max_retries: retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number; avoids a rand dependency.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Whether an HTTP status indicates a transient (retryable) failure.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
///
/// `on_retry(attempt, delay, error)` is called before each backoff sleep,
/// with `attempt` counting from 1. Only the final outcome is returned, so
/// callers observe (and charge for) at most one successful result.
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    attempt_timeout: Duration,
    mut on_retry: R,
    mut op: F,
) -> Result<T, ModelInvocationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelInvocationError>>,
    R: FnMut(u32, Duration, &ModelInvocationError),
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ModelInvocationError::Timeout(attempt_timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                on_retry(attempt, delay, &e);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
