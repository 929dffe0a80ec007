//! Retry with exponential backoff
//!
//! Storage is the only fatal failure class in the engine, and the recovery
//! path is "retry the pass under its idempotency key". This helper drives
//! that loop: exponential backoff between attempts, and a predicate deciding
//! which errors are worth retrying at all.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry behavior configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Base delay in milliseconds, doubled on each attempt
    pub base_delay_ms: u64,

    /// Cap on the backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

/// Run `operation` until it succeeds, retries are exhausted, or an error
/// fails the `should_retry` predicate.
pub async fn with_retry<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = config.delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after delay");
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    warn!(error = %e, "Non-retryable error");
                    return Err(e);
                }
                warn!(attempt, max_retries = config.max_retries, error = %e, "Operation failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.expect("at least one attempt ran"))
}
