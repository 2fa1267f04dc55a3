//! Sender key error types.

use thiserror::Error;

/// Errors produced by the sender-key group cipher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SenderKeyError {
    /// The record holds no sender key state at all.
    ///
    /// This is the normal condition before a distribution message from the
    /// sender has been processed.
    #[error("No sender key state")]
    NoSenderKeyState,

    /// The record has states, but none for the message's key id.
    #[error("No sender key state for key id {key_id}")]
    UnknownKeyId {
        /// Key id carried by the message
        key_id: u32,
    },

    /// Message key for this iteration was already used or evicted.
    #[error("Received message with old counter: {iteration} (current {current})")]
    DuplicateMessage {
        /// Current chain iteration
        current: u32,
        /// Iteration carried by the message
        iteration: u32,
    },

    /// Message is further ahead than the ratchet is willing to skip.
    #[error("Message iteration {requested} too far in future (current {current})")]
    TooFarInFuture {
        /// Current chain iteration
        current: u32,
        /// Iteration carried by the message
        requested: u32,
    },

    /// Ed25519 signature did not verify.
    #[error("Invalid sender key message signature")]
    InvalidSignature,

    /// AEAD decryption failed (tamper or wrong key).
    #[error("Sender key decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for failure
        reason: String,
    },

    /// Encryption requires the signing private key, which only the owner of
    /// the chain holds.
    #[error("Sender key state {key_id} has no signing private key")]
    NotOwnState {
        /// Key id of the state
        key_id: u32,
    },

    /// Chain iteration counter would overflow.
    #[error("Sender chain iteration overflow at {current}")]
    IterationOverflow {
        /// Current iteration
        current: u32,
    },

    /// Malformed record or wire message.
    #[error("Sender key codec error: {0}")]
    Codec(String),
}

impl SenderKeyError {
    /// Returns true if the error means the sender's chain is unknown here and
    /// a (re-)distribution from the sender is needed.
    pub fn is_missing_state(&self) -> bool {
        matches!(self, Self::NoSenderKeyState | Self::UnknownKeyId { .. })
    }
}
