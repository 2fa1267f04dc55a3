//! Pairwise cipher engine binding.
//!
//! The Double Ratchet itself lives outside this crate. The repository drives
//! it through [`SessionCipher`], always handing it a [`SignalStore`] that is
//! scoped to the current transaction.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    address::ProtocolAddress, credentials::PreKeyBundle, error::EngineError,
    signal_store::SignalStore,
};

/// Engine message type discriminant for pre-key (session-establishing)
/// messages.
pub const PREKEY_MESSAGE_TYPE: u8 = 3;

/// Raw output of [`SessionCipher::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextMessage {
    /// Engine type discriminant
    pub message_type: u8,
    /// Serialized message
    pub body: Vec<u8>,
}

/// Pairwise Signal session engine.
#[async_trait]
pub trait SessionCipher: Send + Sync {
    /// Encrypt for `address`, advancing (or establishing) the session.
    async fn encrypt(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, EngineError>;

    /// Decrypt a pre-key message, creating the session if needed.
    async fn decrypt_pre_key_message(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Decrypt a message on an established session.
    async fn decrypt_message(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Start an outgoing session from a peer's published keys.
    async fn init_outgoing(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        bundle: &PreKeyBundle,
    ) -> Result<(), EngineError>;
}

/// Wire tag of an encrypted pairwise message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Session-establishing message (`pkmsg`)
    PreKey,
    /// Message on an established session (`msg`)
    Whisper,
}

impl MessageKind {
    /// Map an engine type discriminant. Only 3 is a pre-key message.
    pub fn from_message_type(message_type: u8) -> Self {
        if message_type == PREKEY_MESSAGE_TYPE { Self::PreKey } else { Self::Whisper }
    }

    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreKey => "pkmsg",
            Self::Whisper => "msg",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown wire tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown message kind: {0:?}")]
pub struct ParseMessageKindError(pub String);

impl FromStr for MessageKind {
    type Err = ParseMessageKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pkmsg" => Ok(Self::PreKey),
            "msg" => Ok(Self::Whisper),
            other => Err(ParseMessageKindError(other.to_string())),
        }
    }
}

/// Result of [`crate::SignalRepository::encrypt_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// Wire tag the receiver dispatches on
    pub kind: MessageKind,
    /// Serialized engine message
    pub ciphertext: Vec<u8>,
}

impl From<CiphertextMessage> for EncryptedMessage {
    fn from(message: CiphertextMessage) -> Self {
        Self { kind: MessageKind::from_message_type(message.message_type), ciphertext: message.body }
    }
}
