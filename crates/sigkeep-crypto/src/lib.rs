//! Sigkeep Sender-Key Primitives
//!
//! Group message encryption for Signal-style sender keys. Every
//! (group, sender) pair owns a chain of symmetric keys; members learn the
//! chain through a distribution message and can then decrypt everything the
//! sender encrypts from that point forward.
//!
//! All functions are pure. Callers supply random bytes (key ids, chain seeds,
//! signing seeds, nonce suffixes) so that tests are deterministic.
//!
//! # Key Lifecycle
//!
//! ```text
//! Fresh chain seed (caller randomness)
//!        │
//!        ▼
//! HMAC-SHA256 Chain Ratchet → Message Seed (per iteration)
//!        │
//!        ▼
//! HKDF → Message Key
//!        │
//!        ▼
//! XChaCha20-Poly1305 → Ciphertext → Ed25519 signature
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain keys only move forward; the previous seed is zeroized
//! - Message keys are dropped after a single use (except the bounded
//!   skipped-key cache needed for out-of-order delivery)
//!
//! Authenticity:
//! - Each sender key message carries an Ed25519 signature made with the
//!   sender's signing key; receivers learn the verifying key from the
//!   distribution message
//! - Failed authentication tag or signature → reject message

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod sender_keys;

pub use sender_keys::{
    FreshSenderKey, MAX_FORWARD_JUMPS, MAX_MESSAGE_KEYS, MAX_SENDER_KEY_STATES, NONCE_RANDOM_SIZE,
    SenderChainKey, SenderKeyDistributionMessage, SenderKeyError, SenderKeyMessage,
    SenderKeyRecord, SenderKeyState, SenderMessageKey, create_distribution_message,
    group_decrypt, group_encrypt, process_distribution_message,
};
