//! Sender-key distribution adapter.
//!
//! Glue between the typed store and the sender-key group cipher. Every
//! function loads the `(group, sender)` record, runs one cipher operation and
//! writes the record back. Callers run these inside a transaction scoped to
//! the group.

use sigkeep_crypto::{
    FreshSenderKey, NONCE_RANDOM_SIZE, SenderKeyDistributionMessage, SenderKeyError,
    SenderKeyRecord, create_distribution_message, group_decrypt, group_encrypt,
    process_distribution_message,
};

use crate::{
    address::SenderKeyName, env::Environment, error::SessionError, signal_store::SignalStore,
};

/// Result of a group encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEncryption {
    /// Serialized sender key message
    pub ciphertext: Vec<u8>,
    /// Serialized distribution message for the sender's chain
    pub distribution_message: Vec<u8>,
}

/// Load the record for `name`, storing an empty one if there is none.
async fn ensure_record(
    store: &dyn SignalStore,
    name: &SenderKeyName,
) -> Result<SenderKeyRecord, SessionError> {
    if let Some(record) = store.load_sender_key(name).await? {
        return Ok(record);
    }

    let record = SenderKeyRecord::new();
    store.store_sender_key(name, &record).await?;
    Ok(record)
}

fn cipher_error(name: &SenderKeyName, err: SenderKeyError) -> SessionError {
    if err.is_missing_state() {
        SessionError::MissingDistributionState { sender_key_name: name.to_string() }
    } else {
        SessionError::Group(err)
    }
}

/// Encrypt with our own chain for the group.
///
/// The distribution message is built before encrypting, so it always lets a
/// new member decrypt the returned ciphertext.
pub(crate) async fn encrypt<E: Environment>(
    store: &dyn SignalStore,
    env: &E,
    name: &SenderKeyName,
    plaintext: &[u8],
) -> Result<GroupEncryption, SessionError> {
    let mut record = ensure_record(store, name).await?;

    let fresh = || FreshSenderKey {
        key_id: env.random_u32() & 0x7FFF_FFFF,
        chain_seed: env.random_key(),
        signing_seed: env.random_key(),
    };
    let distribution =
        create_distribution_message(&mut record, fresh).map_err(|e| cipher_error(name, e))?;

    let mut nonce_suffix = [0u8; NONCE_RANDOM_SIZE];
    env.random_bytes(&mut nonce_suffix);
    let ciphertext =
        group_encrypt(&mut record, plaintext, nonce_suffix).map_err(|e| cipher_error(name, e))?;

    store.store_sender_key(name, &record).await?;

    Ok(GroupEncryption {
        ciphertext,
        distribution_message: distribution.serialize().map_err(SessionError::Group)?,
    })
}

/// Install the author's chain from a serialized distribution message.
///
/// Returns false if the chain was already known.
pub(crate) async fn process(
    store: &dyn SignalStore,
    name: &SenderKeyName,
    distribution: &[u8],
) -> Result<bool, SessionError> {
    let message = SenderKeyDistributionMessage::parse(distribution).map_err(SessionError::Group)?;
    let mut record = ensure_record(store, name).await?;

    let installed = process_distribution_message(&mut record, &message);
    if installed {
        store.store_sender_key(name, &record).await?;
    }

    tracing::debug!(
        group = name.group_id(),
        sender = %name.sender(),
        key_id = message.key_id(),
        installed,
        "Processed sender key distribution"
    );
    Ok(installed)
}

/// Decrypt a group message from the sender named by `name`.
pub(crate) async fn decrypt(
    store: &dyn SignalStore,
    name: &SenderKeyName,
    ciphertext: &[u8],
) -> Result<Vec<u8>, SessionError> {
    let Some(mut record) = store.load_sender_key(name).await? else {
        return Err(SessionError::MissingDistributionState { sender_key_name: name.to_string() });
    };

    let plaintext = group_decrypt(&mut record, ciphertext).map_err(|e| cipher_error(name, e))?;
    store.store_sender_key(name, &record).await?;
    Ok(plaintext)
}
