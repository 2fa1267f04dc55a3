//! Group cipher operations over a [`SenderKeyRecord`].
//!
//! Every function mutates the record in place; the caller persists it. On
//! error the record is left untouched so a failed decrypt never advances or
//! corrupts the chain.

use ed25519_dalek::SigningKey;

use super::{
    chain::{MAX_FORWARD_JUMPS, SenderChainKey, SenderMessageKey},
    encryption::{NONCE_RANDOM_SIZE, decrypt_payload, encrypt_payload},
    error::SenderKeyError,
    message::{SenderKeyDistributionMessage, SenderKeyMessage},
    state::{SenderKeyRecord, SenderKeyState},
};

/// Random material for a brand new own chain.
#[derive(Clone)]
pub struct FreshSenderKey {
    /// Chain identifier
    pub key_id: u32,
    /// Initial chain seed
    pub chain_seed: [u8; 32],
    /// Ed25519 signing key seed
    pub signing_seed: [u8; 32],
}

/// Build a distribution message for the record's newest chain.
///
/// If the record is empty a new own chain is created from `fresh()` first;
/// otherwise `fresh` is never called. Returns the message describing the
/// chain at its current iteration, so the next message encrypted with the
/// record is decryptable by anyone who processes it.
pub fn create_distribution_message(
    record: &mut SenderKeyRecord,
    fresh: impl FnOnce() -> FreshSenderKey,
) -> Result<SenderKeyDistributionMessage, SenderKeyError> {
    if record.is_empty() {
        let fresh = fresh();
        let signing_key = SigningKey::from_bytes(&fresh.signing_seed);
        record.add_state(SenderKeyState::new(
            fresh.key_id,
            SenderChainKey::new(0, fresh.chain_seed),
            signing_key.verifying_key().to_bytes(),
            Some(fresh.signing_seed),
        ));
    }

    let state = record.newest_state().ok_or(SenderKeyError::NoSenderKeyState)?;
    let chain = state.chain_key();

    Ok(SenderKeyDistributionMessage::new(
        state.key_id(),
        chain.iteration(),
        *chain.seed(),
        *state.signing_public(),
    ))
}

/// Install the chain announced by a distribution message.
///
/// Returns `false` if the chain was already known. A known chain is left as
/// is, so replaying a distribution message never rewinds the ratchet.
pub fn process_distribution_message(
    record: &mut SenderKeyRecord,
    message: &SenderKeyDistributionMessage,
) -> bool {
    if record.state_for(message.key_id()).is_some() {
        return false;
    }

    record.add_state(SenderKeyState::new(
        message.key_id(),
        SenderChainKey::new(message.iteration(), *message.chain_seed()),
        *message.signing_public(),
        None,
    ));
    true
}

/// Encrypt with the record's newest (own) chain.
///
/// The message key is kept in the chain's cache so that the sender can
/// decrypt an echo of its own message.
pub fn group_encrypt(
    record: &mut SenderKeyRecord,
    plaintext: &[u8],
    random_suffix: [u8; NONCE_RANDOM_SIZE],
) -> Result<Vec<u8>, SenderKeyError> {
    let state = record.newest_state_mut().ok_or(SenderKeyError::NoSenderKeyState)?;
    let signing_key =
        state.signing_key().ok_or(SenderKeyError::NotOwnState { key_id: state.key_id() })?;

    let message_key = state.chain_key().message_key();
    let next_chain = state.chain_key().next()?;

    let (nonce, ciphertext) = encrypt_payload(plaintext, &message_key, state.key_id(), random_suffix);
    let message = SenderKeyMessage::sign(
        state.key_id(),
        message_key.iteration(),
        nonce,
        ciphertext,
        &signing_key,
    )?;
    let bytes = message.serialize()?;

    state.add_message_key(&message_key);
    state.set_chain_key(next_chain);

    Ok(bytes)
}

/// Decrypt a serialized [`SenderKeyMessage`].
///
/// # Errors
///
/// - `NoSenderKeyState` / `UnknownKeyId`: no distribution processed for this
///   chain
/// - `InvalidSignature`: message not signed by the chain owner
/// - `DuplicateMessage`: iteration already consumed
/// - `TooFarInFuture`: iteration beyond [`MAX_FORWARD_JUMPS`]
/// - `DecryptionFailed`: AEAD failure
pub fn group_decrypt(
    record: &mut SenderKeyRecord,
    bytes: &[u8],
) -> Result<Vec<u8>, SenderKeyError> {
    let message = SenderKeyMessage::parse(bytes)?;

    if record.is_empty() {
        return Err(SenderKeyError::NoSenderKeyState);
    }
    let state = record
        .state_for_mut(message.key_id())
        .ok_or(SenderKeyError::UnknownKeyId { key_id: message.key_id() })?;

    message.verify(&state.verifying_key()?)?;

    // Work on a copy; only commit it once the payload authenticates.
    let mut working = state.clone();
    let message_key = message_key_for(&mut working, message.iteration())?;
    let plaintext = decrypt_payload(message.nonce(), message.ciphertext(), &message_key)?;

    *state = working;
    Ok(plaintext)
}

fn message_key_for(
    state: &mut SenderKeyState,
    iteration: u32,
) -> Result<SenderMessageKey, SenderKeyError> {
    let current = state.chain_key().iteration();

    if iteration < current {
        return state
            .take_message_key(iteration)
            .ok_or(SenderKeyError::DuplicateMessage { current, iteration });
    }

    if iteration - current > MAX_FORWARD_JUMPS {
        return Err(SenderKeyError::TooFarInFuture { current, requested: iteration });
    }

    let mut chain = state.chain_key().clone();
    while chain.iteration() < iteration {
        state.add_message_key(&chain.message_key());
        chain = chain.next()?;
    }

    let message_key = chain.message_key();
    state.set_chain_key(chain.next()?);
    Ok(message_key)
}
