//! Storage error types.

use thiserror::Error;

/// Errors returned by [`super::KeyStore`] backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend I/O failure (disk, network, poisoned handle).
    ///
    /// May be transient.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Write conflicted with a concurrent external change.
    ///
    /// The unit of work that produced the write should be re-run against
    /// fresh state.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// Stored bytes could not be decoded (or a value could not be encoded).
    ///
    /// Not transient.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns true if re-running the transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Conflict(_))
    }
}
