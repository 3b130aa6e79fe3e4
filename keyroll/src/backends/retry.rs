//! Bounded per-backend retry.
//!
//! The default policy retries every failure kind immediately, up to two extra
//! attempts. [`RetryOn`] narrows which failures are retried and `delay` adds a
//! fixed pause between attempts; neither is enabled by default.

use super::BackendError;
use std::future::Future;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Which failures get another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryOn {
    /// Every failure, transport or decode.
    #[default]
    AnyFailure,
    /// Transport failures, except client errors that will not change on retry.
    Transient,
    /// Transport failures only; decode failures end the loop.
    TransportOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_on: RetryOn,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_on: RetryOn::AnyFailure,
            delay: Duration::ZERO,
        }
    }
}

/// True for a client error (4xx) that should not be retried, excluding 429 and 408.
pub fn is_non_retryable(err: &BackendError) -> bool {
    match err.status() {
        Some(code) => (400..500).contains(&code) && code != 429 && code != 408,
        None => false,
    }
}

impl RetryPolicy {
    /// Retry every failure `max_retries` times with no pause.
    pub fn uniform(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::uniform(0)
    }

    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total attempts the policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether `err`, raised by zero-based attempt `attempt`, earns another try.
    pub fn should_retry(&self, err: &BackendError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match self.retry_on {
            RetryOn::AnyFailure => true,
            RetryOn::TransportOnly => !err.is_decode(),
            RetryOn::Transient => !err.is_decode() && !is_non_retryable(err),
        }
    }

    /// Run `op` until it succeeds or the policy gives up, returning the first
    /// success or the last failure. `op` receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.should_retry(&e, attempt) {
                        return Err(e);
                    }
                    tracing::debug!(attempt, error = %e, "retrying");
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
