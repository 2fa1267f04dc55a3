//! Error types for the session repository.
//!
//! Three layers:
//!
//! - [`StoreError`] from the key-value backend
//! - [`EngineError`] from the pairwise cipher engine, whose failures are
//!   mostly unstructured text
//! - [`SessionError`] returned by the repository, with [`SessionError::kind`]
//!   giving the coarse category callers branch on

use sigkeep_crypto::SenderKeyError;
use thiserror::Error;

use crate::{address::AddressError, store::StoreError};

/// Failure reported by the pairwise cipher engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Protocol failure described only by the engine's message text.
    ///
    /// The classifier inspects this text to decide whether the session can
    /// be repaired.
    #[error("{0}")]
    Protocol(String),

    /// The engine failed to read or write key material.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Protocol error from any message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// Coarse error category exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No usable session for the peer
    SessionRecord,
    /// Message authentication failed
    Mac,
    /// Commit kept conflicting
    TransactionFailed,
    /// Group message from a sender whose key was never distributed
    MissingDistributionState,
    /// Everything else; never retried
    Other,
}

/// Errors returned by [`crate::SignalRepository`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session record missing or unusable.
    ///
    /// Displays the engine text unchanged.
    #[error("{source}")]
    SessionRecord {
        /// Peer address (`user.device`)
        address: String,
        /// Engine failure
        source: EngineError,
    },

    /// MAC verification failed.
    ///
    /// Displays the engine text unchanged.
    #[error("{source}")]
    Mac {
        /// Peer address (`user.device`)
        address: String,
        /// Engine failure
        source: EngineError,
    },

    /// The transaction could not be committed.
    #[error("transaction on {key} failed after {attempts} attempts: {source}")]
    TransactionFailed {
        /// Conversation key the transaction was scoped to
        key: String,
        /// Total commit attempts made
        attempts: u32,
        /// Last commit error
        source: StoreError,
    },

    /// No sender key state for this `(group, sender)`.
    #[error("missing sender key distribution state for {sender_key_name}")]
    MissingDistributionState {
        /// Sender key name (`group::user::device`)
        sender_key_name: String,
    },

    /// Engine failure that is not recoverable.
    #[error(transparent)]
    Engine(EngineError),

    /// Storage failure outside a commit.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Group cipher failure other than missing state.
    #[error(transparent)]
    Group(SenderKeyError),

    /// Jid or address could not be parsed.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Group operation called with an empty group id.
    #[error("group id is required")]
    MissingGroupId,

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// Coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionRecord { .. } => ErrorKind::SessionRecord,
            Self::Mac { .. } => ErrorKind::Mac,
            Self::TransactionFailed { .. } => ErrorKind::TransactionFailed,
            Self::MissingDistributionState { .. } => ErrorKind::MissingDistributionState,
            Self::Engine(_)
            | Self::Store(_)
            | Self::Group(_)
            | Self::Address(_)
            | Self::MissingGroupId
            | Self::Config(_) => ErrorKind::Other,
        }
    }

    /// Engine failure behind this error, if any.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::SessionRecord { source, .. } | Self::Mac { source, .. } => Some(source),
            Self::Engine(source) => Some(source),
            _ => None,
        }
    }
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(store) => Self::Store(store),
            protocol @ EngineError::Protocol(_) => Self::Engine(protocol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_variants_display_engine_text() {
        let err = SessionError::Mac {
            address: "123.0".to_string(),
            source: EngineError::protocol("Bad MAC"),
        };
        assert_eq!(err.to_string(), "Bad MAC");
        assert_eq!(err.kind(), ErrorKind::Mac);
    }

    #[test]
    fn store_errors_are_other() {
        let err = SessionError::from(EngineError::Store(StoreError::Io("disk".to_string())));
        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn transaction_failed_kind() {
        let err = SessionError::TransactionFailed {
            key: "peer:1.0".to_string(),
            attempts: 6,
            source: StoreError::Conflict("moved".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::TransactionFailed);
        assert!(err.to_string().contains("6 attempts"));
    }

    #[test]
    fn missing_distribution_kind() {
        let err =
            SessionError::MissingDistributionState { sender_key_name: "g::u::0".to_string() };
        assert_eq!(err.kind(), ErrorKind::MissingDistributionState);
    }
}
