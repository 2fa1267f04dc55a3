//! Sender chain ratchet for forward-secure message key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: a chain key only yields its successor, never its
//!   predecessor
//! - Key Uniqueness: each iteration produces a unique message seed
//! - Determinism: same seed always produces same key sequence

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use super::{derivation::derive_message_cipher_key, error::SenderKeyError};

type HmacSha256 = Hmac<Sha256>;

/// Label for deriving the next chain key
const CHAIN_LABEL: &[u8] = b"chain";

/// Label for deriving a message seed
const MESSAGE_LABEL: &[u8] = b"message";

/// Maximum number of iterations a receiver skips to reach a message.
///
/// Limits the work an attacker can force with a forged iteration counter.
pub const MAX_FORWARD_JUMPS: u32 = 25_000;

/// One link of a sender's symmetric chain.
///
/// Persisted inside [`crate::SenderKeyState`]. Advancing produces a new link;
/// the caller replaces the stored link so older seeds disappear.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderChainKey {
    iteration: u32,
    seed: [u8; 32],
}

impl SenderChainKey {
    /// Chain link at `iteration` with the given seed.
    pub fn new(iteration: u32, seed: [u8; 32]) -> Self {
        Self { iteration, seed }
    }

    /// Iteration this link produces a message key for.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Raw chain seed. Only exported inside distribution messages.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Message key for this link's iteration.
    pub fn message_key(&self) -> SenderMessageKey {
        SenderMessageKey::from_seed(self.iteration, hmac_label(&self.seed, MESSAGE_LABEL))
    }

    /// Next link in the chain.
    pub fn next(&self) -> Result<Self, SenderKeyError> {
        let iteration = self
            .iteration
            .checked_add(1)
            .ok_or(SenderKeyError::IterationOverflow { current: self.iteration })?;

        Ok(Self { iteration, seed: hmac_label(&self.seed, CHAIN_LABEL) })
    }
}

impl fmt::Debug for SenderChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderChainKey")
            .field("iteration", &self.iteration)
            .field("seed", &"<redacted>")
            .finish()
    }
}

impl Drop for SenderChainKey {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

/// Key material for exactly one sender key message.
///
/// The seed is what gets cached for skipped iterations; the AEAD key is
/// derived from it on demand.
#[derive(Clone)]
pub struct SenderMessageKey {
    iteration: u32,
    seed: [u8; 32],
}

impl SenderMessageKey {
    pub(crate) fn from_seed(iteration: u32, seed: [u8; 32]) -> Self {
        Self { iteration, seed }
    }

    /// Iteration this key belongs to.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Seed the key was derived from.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// 32-byte key for XChaCha20-Poly1305.
    pub fn cipher_key(&self) -> [u8; 32] {
        derive_message_cipher_key(&self.seed, self.iteration)
    }
}

impl Drop for SenderMessageKey {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

fn hmac_label(key: &[u8; 32], label: &[u8]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(label);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}
