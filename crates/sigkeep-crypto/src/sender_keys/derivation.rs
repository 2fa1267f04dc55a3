//! Message key derivation using HKDF

use hkdf::Hkdf;
use sha2::Sha256;

/// Label used for message key derivation
const MESSAGE_KEY_LABEL: &[u8] = b"sigkeepSenderMsgV1";

/// Derive the AEAD key for one sender key message.
///
/// The iteration is bound into the HKDF info so that a message seed can never
/// be replayed as the key of a different iteration.
pub fn derive_message_cipher_key(message_seed: &[u8; 32], iteration: u32) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, message_seed);

    // label || iteration
    let mut info = Vec::with_capacity(MESSAGE_KEY_LABEL.len() + 4);
    info.extend_from_slice(MESSAGE_KEY_LABEL);
    info.extend_from_slice(&iteration.to_be_bytes());

    let mut key = [0u8; 32];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    key
}
