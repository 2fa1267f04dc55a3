//! Fuzz target for the sender-key group cipher
//!
//! Drives one sender record and one receiver record through arbitrary
//! encrypt, deliver, replay and tamper sequences.
//!
//! # Strategy
//!
//! - Arbitrary chain seeds, signing seeds and key ids
//! - Out-of-order delivery of previously encrypted messages
//! - Replays of delivered messages
//! - Single-byte corruption of ciphertexts
//! - Random bytes as distribution and sender key messages
//!
//! # Invariants
//!
//! - A genuine message decrypts to its plaintext, at most once
//! - Replays of delivered messages fail with `DuplicateMessage`
//! - Processing a distribution message twice is a no-op
//! - NEVER panic on malformed input

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sigkeep_crypto::{
    create_distribution_message, group_decrypt, group_encrypt, process_distribution_message,
    FreshSenderKey, SenderKeyDistributionMessage, SenderKeyError, SenderKeyRecord,
};

#[derive(Debug, Clone, Arbitrary)]
struct GroupScenario {
    key_id: u32,
    chain_seed: [u8; 32],
    signing_seed: [u8; 32],
    nonce_suffix: [u8; 16],
    operations: Vec<GroupOperation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum GroupOperation {
    /// Sender encrypts and queues the message
    Encrypt { plaintext: Vec<u8> },
    /// Receiver decrypts a queued message (index wraps)
    Deliver { index: u8 },
    /// Receiver decrypts an already delivered message again
    Replay { index: u8 },
    /// Receiver decrypts a queued message with one byte flipped
    Tamper { index: u8, offset: u16, mask: u8 },
    /// Receiver processes the sender's distribution message again
    Redistribute,
    /// Random bytes as a distribution message
    GarbageDistribution { bytes: Vec<u8> },
    /// Random bytes as a sender key message
    GarbageMessage { bytes: Vec<u8> },
}

struct Sent {
    plaintext: Vec<u8>,
    ciphertext: Vec<u8>,
    delivered: bool,
}

fuzz_target!(|scenario: GroupScenario| {
    let mut sender = SenderKeyRecord::new();
    let mut receiver = SenderKeyRecord::new();

    let fresh = FreshSenderKey {
        key_id: scenario.key_id & 0x7FFF_FFFF,
        chain_seed: scenario.chain_seed,
        signing_seed: scenario.signing_seed,
    };
    let Ok(distribution) = create_distribution_message(&mut sender, || fresh) else {
        return;
    };
    assert!(process_distribution_message(&mut receiver, &distribution));

    let mut sent: Vec<Sent> = Vec::new();

    for op in scenario.operations {
        match op {
            GroupOperation::Encrypt { plaintext } => {
                if let Ok(ciphertext) = group_encrypt(&mut sender, &plaintext, scenario.nonce_suffix)
                {
                    sent.push(Sent { plaintext, ciphertext, delivered: false });
                }
            },

            GroupOperation::Deliver { index } => {
                if sent.is_empty() {
                    continue;
                }
                let len = sent.len();
                let message = &mut sent[usize::from(index) % len];
                let result = group_decrypt(&mut receiver, &message.ciphertext);

                if message.delivered {
                    assert!(matches!(result, Err(SenderKeyError::DuplicateMessage { .. })));
                } else if let Ok(plaintext) = result {
                    assert_eq!(plaintext, message.plaintext);
                    message.delivered = true;
                }
            },

            GroupOperation::Replay { index } => {
                let delivered: Vec<&Sent> = sent.iter().filter(|m| m.delivered).collect();
                if delivered.is_empty() {
                    continue;
                }
                let message = delivered[usize::from(index) % delivered.len()];
                assert!(group_decrypt(&mut receiver, &message.ciphertext).is_err());
            },

            GroupOperation::Tamper { index, offset, mask } => {
                if sent.is_empty() || mask == 0 {
                    continue;
                }
                let message = &sent[usize::from(index) % sent.len()];
                if message.ciphertext.is_empty() {
                    continue;
                }
                let mut corrupted = message.ciphertext.clone();
                let at = usize::from(offset) % corrupted.len();
                corrupted[at] ^= mask;

                if let Ok(plaintext) = group_decrypt(&mut receiver, &corrupted) {
                    // Only bytes the codec ignores may survive a flip.
                    assert_eq!(plaintext, message.plaintext);
                }
            },

            GroupOperation::Redistribute => {
                assert!(!process_distribution_message(&mut receiver, &distribution));
            },

            GroupOperation::GarbageDistribution { bytes } => {
                if let Ok(message) = SenderKeyDistributionMessage::parse(&bytes) {
                    let mut scratch = receiver.clone();
                    let _ = process_distribution_message(&mut scratch, &message);
                }
            },

            GroupOperation::GarbageMessage { bytes } => {
                let _ = group_decrypt(&mut receiver, &bytes);
            },
        }
    }
});
