//! Payload encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - random bytes must be provided by the caller.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroize;

use super::{chain::SenderMessageKey, error::SenderKeyError};

/// Size of the random suffix in the nonce (16 bytes)
pub const NONCE_RANDOM_SIZE: usize = 16;

/// Encrypt a payload with a sender message key.
///
/// Returns the 24-byte nonce and the ciphertext (including the 16-byte
/// Poly1305 tag).
pub(crate) fn encrypt_payload(
    plaintext: &[u8],
    message_key: &SenderMessageKey,
    key_id: u32,
    random_suffix: [u8; NONCE_RANDOM_SIZE],
) -> ([u8; 24], Vec<u8>) {
    let nonce = build_nonce(key_id, message_key.iteration(), random_suffix);
    let mut key = message_key.cipher_key();
    let cipher = XChaCha20Poly1305::new((&key).into());
    key.zeroize();

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    (nonce, ciphertext)
}

/// Decrypt a payload with a sender message key.
///
/// # Errors
///
/// - `DecryptionFailed`: nonce does not belong to this key, or the
///   authentication tag is wrong (tamper or wrong key)
pub(crate) fn decrypt_payload(
    nonce: &[u8; 24],
    ciphertext: &[u8],
    message_key: &SenderMessageKey,
) -> Result<Vec<u8>, SenderKeyError> {
    let nonce_iteration = u32::from_be_bytes([nonce[4], nonce[5], nonce[6], nonce[7]]);
    if nonce_iteration != message_key.iteration() {
        return Err(SenderKeyError::DecryptionFailed {
            reason: format!(
                "iteration mismatch: key is {}, nonce is {nonce_iteration}",
                message_key.iteration()
            ),
        });
    }

    let mut key = message_key.cipher_key();
    let cipher = XChaCha20Poly1305::new((&key).into());
    key.zeroize();

    cipher.decrypt(XNonce::from_slice(nonce), ciphertext).map_err(|_| {
        SenderKeyError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

/// Build a 24-byte nonce for `XChaCha20`.
///
/// Structure:
/// - bytes 0-3: `key_id` (big-endian)
/// - bytes 4-7: iteration (big-endian)
/// - bytes 8-23: random suffix (caller-provided)
fn build_nonce(key_id: u32, iteration: u32, random_suffix: [u8; NONCE_RANDOM_SIZE]) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[0..4].copy_from_slice(&key_id.to_be_bytes());
    nonce[4..8].copy_from_slice(&iteration.to_be_bytes());
    nonce[8..24].copy_from_slice(&random_suffix);
    nonce
}
