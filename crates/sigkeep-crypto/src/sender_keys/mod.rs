//! Sender keys: chain ratchet, records, wire messages and the group cipher.

mod chain;
mod derivation;
mod encryption;
mod error;
mod group_cipher;
mod message;
mod state;

pub use chain::{MAX_FORWARD_JUMPS, SenderChainKey, SenderMessageKey};
pub use encryption::NONCE_RANDOM_SIZE;
pub use error::SenderKeyError;
pub use group_cipher::{
    FreshSenderKey, create_distribution_message, group_decrypt, group_encrypt,
    process_distribution_message,
};
pub use message::{SenderKeyDistributionMessage, SenderKeyMessage};
pub use state::{MAX_MESSAGE_KEYS, MAX_SENDER_KEY_STATES, SenderKeyRecord, SenderKeyState};
