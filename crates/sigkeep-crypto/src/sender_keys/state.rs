//! Sender key records and per-chain state.

use std::{collections::VecDeque, fmt};

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{
    chain::{SenderChainKey, SenderMessageKey},
    error::SenderKeyError,
    message::{from_cbor, to_cbor},
};

/// Number of chains a record remembers per (group, sender).
///
/// A sender that rotates its chain keeps older chains decryptable for
/// in-flight messages until they fall off the end.
pub const MAX_SENDER_KEY_STATES: usize = 5;

/// Number of unused message keys kept per chain.
pub const MAX_MESSAGE_KEYS: usize = 2_000;

#[derive(Clone, Serialize, Deserialize)]
struct StoredMessageKey {
    iteration: u32,
    seed: [u8; 32],
}

impl Drop for StoredMessageKey {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

/// State of one sender chain.
///
/// A state created locally for our own sends carries the signing private key;
/// a state installed from a distribution message only carries the public
/// half.
#[derive(Clone, Serialize, Deserialize)]
pub struct SenderKeyState {
    key_id: u32,
    chain_key: SenderChainKey,
    signing_public: [u8; 32],
    signing_private: Option<[u8; 32]>,
    message_keys: VecDeque<StoredMessageKey>,
}

impl SenderKeyState {
    /// State positioned at `chain_key`.
    pub fn new(
        key_id: u32,
        chain_key: SenderChainKey,
        signing_public: [u8; 32],
        signing_private: Option<[u8; 32]>,
    ) -> Self {
        Self { key_id, chain_key, signing_public, signing_private, message_keys: VecDeque::new() }
    }

    /// Chain identifier.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Current chain link.
    pub fn chain_key(&self) -> &SenderChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: SenderChainKey) {
        self.chain_key = chain_key;
    }

    /// Ed25519 verifying key bytes.
    pub fn signing_public(&self) -> &[u8; 32] {
        &self.signing_public
    }

    /// True if this is one of our own chains.
    pub fn is_own(&self) -> bool {
        self.signing_private.is_some()
    }

    pub(crate) fn signing_key(&self) -> Option<SigningKey> {
        self.signing_private.as_ref().map(SigningKey::from_bytes)
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey, SenderKeyError> {
        VerifyingKey::from_bytes(&self.signing_public)
            .map_err(|e| SenderKeyError::Codec(format!("invalid signing key: {e}")))
    }

    /// Number of cached message keys.
    pub fn cached_message_keys(&self) -> usize {
        self.message_keys.len()
    }

    pub(crate) fn add_message_key(&mut self, key: &SenderMessageKey) {
        self.message_keys.push_back(StoredMessageKey { iteration: key.iteration(), seed: *key.seed() });
        while self.message_keys.len() > MAX_MESSAGE_KEYS {
            self.message_keys.pop_front();
        }
    }

    pub(crate) fn take_message_key(&mut self, iteration: u32) -> Option<SenderMessageKey> {
        let position = self.message_keys.iter().position(|k| k.iteration == iteration)?;
        self.message_keys
            .remove(position)
            .map(|stored| SenderMessageKey::from_seed(stored.iteration, stored.seed))
    }
}

impl fmt::Debug for SenderKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderKeyState")
            .field("key_id", &self.key_id)
            .field("chain_key", &self.chain_key)
            .field("own", &self.is_own())
            .field("cached_message_keys", &self.message_keys.len())
            .finish()
    }
}

impl Drop for SenderKeyState {
    fn drop(&mut self) {
        if let Some(private) = self.signing_private.as_mut() {
            private.zeroize();
        }
    }
}

/// All chains known for one (group, sender) pair, newest first.
///
/// An empty record is valid: it is what gets stored the first time a pair is
/// touched, before any chain exists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no chain is known.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of chains held.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Most recently added chain.
    pub fn newest_state(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    pub(crate) fn newest_state_mut(&mut self) -> Option<&mut SenderKeyState> {
        self.states.front_mut()
    }

    /// Chain with the given key id.
    pub fn state_for(&self, key_id: u32) -> Option<&SenderKeyState> {
        self.states.iter().find(|s| s.key_id == key_id)
    }

    pub(crate) fn state_for_mut(&mut self, key_id: u32) -> Option<&mut SenderKeyState> {
        self.states.iter_mut().find(|s| s.key_id == key_id)
    }

    /// Add a chain as the newest one, evicting the oldest past
    /// [`MAX_SENDER_KEY_STATES`]. A chain with the same key id is replaced.
    pub fn add_state(&mut self, state: SenderKeyState) {
        self.states.retain(|s| s.key_id != state.key_id);
        self.states.push_front(state);
        self.states.truncate(MAX_SENDER_KEY_STATES);
    }

    /// Encode as CBOR.
    pub fn serialize(&self) -> Result<Vec<u8>, SenderKeyError> {
        to_cbor(self)
    }

    /// Decode from CBOR.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SenderKeyError> {
        from_cbor(bytes)
    }
}
