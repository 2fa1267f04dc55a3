//! Long-term identity material supplied by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type prefix of a Signal-encoded Curve25519 public key.
pub const DJB_KEY_TYPE: u8 = 0x05;

/// A raw 32-byte key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Public key (raw, without type prefix)
    pub public: [u8; 32],
    /// Private key
    pub private: [u8; 32],
}

impl KeyPair {
    /// Pair from raw key bytes.
    pub fn new(public: [u8; 32], private: [u8; 32]) -> Self {
        Self { public, private }
    }

    /// Public key with the `0x05` type prefix the Signal engine expects.
    pub fn signal_public_key(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = DJB_KEY_TYPE;
        out[1..].copy_from_slice(&self.public);
        out
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Signed pre-key published with the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKey {
    /// Key id
    pub key_id: u32,
    /// Key material
    pub key_pair: KeyPair,
    /// Identity signature over the prefixed public key
    pub signature: Vec<u8>,
}

/// One-time pre-key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKey {
    /// Key id
    pub key_id: u32,
    /// Key material
    pub key_pair: KeyPair,
}

/// Credentials the repository answers identity queries from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredentials {
    /// Local registration id
    pub registration_id: u32,
    /// Long-term identity key pair
    pub identity_key: KeyPair,
    /// Current signed pre-key
    pub signed_pre_key: SignedPreKey,
}

/// A peer's published keys, used to start an outgoing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeyBundle {
    /// Peer registration id
    pub registration_id: u32,
    /// Peer device id
    pub device_id: u32,
    /// Peer identity public key
    pub identity_key: [u8; 32],
    /// Signed pre-key id
    pub signed_pre_key_id: u32,
    /// Signed pre-key public key
    pub signed_pre_key: [u8; 32],
    /// Signature over the signed pre-key
    pub signed_pre_key_signature: Vec<u8>,
    /// Optional one-time pre-key `(id, public key)`
    pub pre_key: Option<(u32, [u8; 32])>,
}
