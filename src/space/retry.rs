//! Retrying SpaceCode calls.
//!
//! Transient failures are retried with exponential backoff. A rate-limited
//! response that names a `Retry-After` is retried no sooner than that, and
//! not at all if it asks for more than `max_delay`: the caller is usually
//! answering a webhook delivery and would rather fail than stall.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::SpaceApiError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first call.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Upper bound for any single wait, backoff or `Retry-After`.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Waits 2s, 4s, 8s.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    fn backoff(&self, retry: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(retry as i32);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// How long to wait before retry number `retry` (0-based) after `error`,
    /// or `None` to give up.
    pub fn wait_after(&self, retry: u32, error: &SpaceApiError) -> Option<Duration> {
        if !error.kind.is_retriable() || retry >= self.max_retries {
            return None;
        }
        let backoff = self.backoff(retry);
        match error.retry_after {
            Some(asked) if asked > self.max_delay => None,
            Some(asked) => Some(asked.max(backoff)),
            None => Some(backoff),
        }
    }

    /// Longest total backoff a call can spend waiting without rate limits.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_retries).map(|retry| self.backoff(retry)).sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Calls `call` until it succeeds or [`RetryConfig::wait_after`] gives up.
///
/// `what` names the call in logs.
pub async fn with_retries<T, F, Fut>(config: RetryConfig, what: &str, mut call: F) -> Result<T, SpaceApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SpaceApiError>>,
{
    let mut retry = 0;
    loop {
        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        let Some(wait) = config.wait_after(retry, &error) else {
            if error.kind.is_retriable() {
                warn!(call = what, attempts = retry + 1, error = %error, "Giving up on SpaceCode call");
            }
            return Err(error);
        };
        debug!(call = what, retry, ?wait, error = %error, "Retrying SpaceCode call");
        tokio::time::sleep(wait).await;
        retry += 1;
    }
}
