//! Repository configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::SessionError, recovery::RetryPolicy};

/// Largest accepted `max_retries`; keeps the backoff factor well inside `u32`.
pub const MAX_RECOVERY_RETRIES: u32 = 16;

/// Largest accepted `max_commit_retries`.
pub const MAX_COMMIT_RETRIES: u32 = 16;

/// Repository tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Recovery retries after a recoverable decrypt failure
    pub max_retries: u32,
    /// First recovery backoff delay; doubles per retry
    pub base_delay_ms: u64,
    /// Commit retries after a retryable store error
    pub max_commit_retries: u32,
    /// Wait before each commit retry
    pub commit_retry_delay_ms: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self { max_retries: 4, base_delay_ms: 50, max_commit_retries: 5, commit_retry_delay_ms: 200 }
    }
}

impl RepositoryConfig {
    /// Reject values the repository cannot honour.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.max_retries > MAX_RECOVERY_RETRIES {
            return Err(SessionError::Config(format!(
                "max_retries {} exceeds {MAX_RECOVERY_RETRIES}",
                self.max_retries
            )));
        }
        if self.max_commit_retries > MAX_COMMIT_RETRIES {
            return Err(SessionError::Config(format!(
                "max_commit_retries {} exceeds {MAX_COMMIT_RETRIES}",
                self.max_commit_retries
            )));
        }
        Ok(())
    }

    /// Recovery policy for pairwise decrypts.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_retries, Duration::from_millis(self.base_delay_ms))
    }

    /// Wait before each commit retry.
    pub fn commit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.commit_retry_delay_ms)
    }
}
