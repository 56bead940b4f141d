//! Retry policy for directive handlers
//!
//! Bounded, classified retries. Fatal errors abort immediately; transient
//! ones (network, timeout, rate limit) are retried with a backoff delay.

use crate::error::ActionError;
use crate::models::ActionKind;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Signatures that make an error fatal, checked first
const FATAL_PATTERNS: &[&str] = &[
    "invalid",
    "not found",
    "permission denied",
    "forbidden",
    "unauthorized",
];

const RETRYABLE_PATTERNS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "rate limit",
    "rate-limit",
    "too many requests",
    "429",
    "503",
    "connection",
    "temporarily unavailable",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Retryable)
    }
}

/// Classify an error message. Unrecognized messages are fatal.
pub fn classify_error(message: &str) -> ErrorClass {
    let message = message.to_lowercase();

    if FATAL_PATTERNS.iter().any(|p| message.contains(p)) {
        return ErrorClass::Fatal;
    }

    if RETRYABLE_PATTERNS.iter().any(|p| message.contains(p)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    None,
    Fixed,
    /// `backoff_ms` multiplied by the retry number
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Backoff,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::Linear,
            backoff_ms: 500,
        }
    }
}

/// Final failure after the policy gave up.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RetryError {
    pub error: ActionError,
    /// Classification of the last error, kept for manual-retry decisions
    pub retryable: bool,
    pub attempts: u32,
}

#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = Duration::from_millis(self.config.backoff_ms);
        match self.config.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed => base,
            Backoff::Linear => base.checked_mul(retry).unwrap_or(Duration::MAX),
        }
    }

    /// Run `operation` up to `max_retries + 1` times.
    ///
    /// `on_attempt(retry, max_retries)` fires before every retry, never
    /// before the first call.
    pub async fn run_with_retry<T, F, Fut, A>(
        &self,
        kind: ActionKind,
        mut operation: F,
        mut on_attempt: A,
    ) -> Result<Retried<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
        A: FnMut(u32, u32),
    {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(kind = %kind, attempt, "Operation succeeded after retry");
                    }
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!(kind = %kind, attempt, error = %error, "Fatal error, not retrying");
                return Err(RetryError {
                    error,
                    retryable: false,
                    attempts: attempt,
                });
            }

            if attempt > max_retries {
                warn!(kind = %kind, attempt, error = %error, "Retry budget exhausted");
                return Err(RetryError {
                    error,
                    retryable: true,
                    attempts: attempt,
                });
            }

            debug!(kind = %kind, attempt, error = %error, "Transient error, retrying");
            on_attempt(attempt, max_retries);

            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            backoff: Backoff::None,
            backoff_ms: 0,
        })
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_error("Request timeout: upstream"), ErrorClass::Retryable);
        assert_eq!(classify_error("Network error: reset"), ErrorClass::Retryable);
        assert_eq!(classify_error("HTTP 429 Too Many Requests"), ErrorClass::Retryable);
        assert_eq!(classify_error("Rate limit exceeded"), ErrorClass::Retryable);
        assert_eq!(classify_error("Permission denied: tabs"), ErrorClass::Fatal);
        assert_eq!(classify_error("Tab not found"), ErrorClass::Fatal);
        assert_eq!(classify_error("Forbidden"), ErrorClass::Fatal);
        assert_eq!(classify_error("invalid network payload"), ErrorClass::Fatal);
        assert_eq!(classify_error("something odd happened"), ErrorClass::Fatal);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 3,
            backoff: Backoff::Linear,
            backoff_ms: 100,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn test_linear_backoff_saturates() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 3,
            backoff: Backoff::Linear,
            backoff_ms: u64::MAX,
        });
        assert_eq!(policy.delay_for(2), Duration::MAX);
    }

    #[tokio::test]
    async fn test_succeeds_after_two_timeouts() {
        let calls = AtomicU32::new(0);
        let mut notified = Vec::new();

        let result = policy(2)
            .run_with_retry(
                ActionKind::Scrape,
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(ActionError::Timeout("page load".to_string()))
                        } else {
                            Ok("done")
                        }
                    }
                },
                |attempt, max| notified.push((attempt, max)),
            )
            .await;

        let retried = result.unwrap();
        assert_eq!(retried.value, "done");
        assert_eq!(retried.attempts, 3);
        assert_eq!(notified, vec![(1, 2), (2, 2)]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let mut notified = 0;

        let result: Result<Retried<()>, RetryError> = policy(2)
            .run_with_retry(
                ActionKind::Open,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ActionError::PermissionDenied("tabs".to_string())) }
                },
                |_, _| notified += 1,
            )
            .await;

        let err = result.unwrap_err();
        assert!(!err.retryable);
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(notified, 0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_keeps_classification() {
        let calls = AtomicU32::new(0);

        let result: Result<Retried<()>, RetryError> = policy(2)
            .run_with_retry(
                ActionKind::Navigate,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ActionError::Network("connection reset".to_string())) }
                },
                |_, _| {},
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_fixed_backoff_waits_between_attempts() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 1,
            backoff: Backoff::Fixed,
            backoff_ms: 5,
        });
        let calls = AtomicU32::new(0);
        let started = std::time::Instant::now();

        let result = policy
            .run_with_retry(
                ActionKind::Search,
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(ActionError::RateLimited("search".to_string()))
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_, _| {},
            )
            .await;

        tokio_test::assert_ok!(result);
        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
