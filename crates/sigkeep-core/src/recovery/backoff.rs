//! Retry decisions and backoff.

use std::{sync::Arc, time::Duration};

use super::classify::Classification;

/// Delay before retry number `attempt + 1`.
pub trait BackoffPolicy: Send + Sync {
    /// Delay after failed attempt `attempt` (0-based).
    fn delay(&self, attempt: u32) -> Duration;
}

/// `base * 2^attempt`, saturating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
}

impl ExponentialBackoff {
    /// Backoff starting at `base`.
    pub fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Recover, wait `delay`, then try again
    Retry {
        /// Wait before the next attempt
        delay: Duration,
    },
    /// Give up and surface the error
    Fail,
}

/// Bounded retry policy for recoverable failures.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Arc<dyn BackoffPolicy>,
}

impl RetryPolicy {
    /// Up to `max_retries` retries (so `max_retries + 1` attempts).
    pub fn new(max_retries: u32, backoff: impl BackoffPolicy + 'static) -> Self {
        Self { max_retries, backoff: Arc::new(backoff) }
    }

    /// Exponential policy from `base`.
    pub fn exponential(max_retries: u32, base: Duration) -> Self {
        Self::new(max_retries, ExponentialBackoff::new(base))
    }

    /// Retry limit.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide after attempt `attempt` (0-based) failed with `classification`.
    pub fn decide(&self, attempt: u32, classification: Classification) -> RetryDecision {
        if !classification.recoverable || attempt >= self.max_retries {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry { delay: self.backoff.delay(attempt) }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy").field("max_retries", &self.max_retries).finish_non_exhaustive()
    }
}
