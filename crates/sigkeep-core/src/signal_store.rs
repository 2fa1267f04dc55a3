//! Typed Signal key store over an opaque [`KeyStore`].
//!
//! Record layout:
//!
//! | kind         | id                    | value                       |
//! |--------------|-----------------------|-----------------------------|
//! | `session`    | `user.device`         | engine-owned session bytes  |
//! | `pre-key`    | decimal pre-key id    | CBOR [`PreKey`]             |
//! | `sender-key` | `group::user::device` | CBOR [`SenderKeyRecord`]    |
//!
//! Identity, registration id and the signed pre-key come from the caller's
//! [`AuthCredentials`] and are never written.

use std::sync::Arc;

use async_trait::async_trait;
use sigkeep_crypto::SenderKeyRecord;

use crate::{
    address::{ProtocolAddress, SenderKeyName},
    credentials::{AuthCredentials, KeyPair, PreKey, SignedPreKey},
    store::{KeyMutations, KeyStore, RecordKind, StoreError},
};

/// Serialized pairwise session, owned by the cipher engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord(Vec<u8>);

impl SessionRecord {
    /// Wrap engine bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Storage interface the cipher engines run against.
///
/// Inside a repository operation this is always backed by the operation's
/// transaction, so reads see buffered writes and nothing reaches the backend
/// until commit.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Session for `address`, if any.
    async fn load_session(
        &self,
        address: &ProtocolAddress,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Replace the session for `address`.
    async fn store_session(
        &self,
        address: &ProtocolAddress,
        record: SessionRecord,
    ) -> Result<(), StoreError>;

    /// One-time pre-key by id.
    async fn load_pre_key(&self, key_id: u32) -> Result<Option<PreKey>, StoreError>;

    /// Remove a consumed one-time pre-key.
    async fn remove_pre_key(&self, key_id: u32) -> Result<(), StoreError>;

    /// Current signed pre-key.
    ///
    /// There is only ever one, so the engine's requested id is not checked.
    fn signed_pre_key(&self) -> &SignedPreKey;

    /// Local identity key pair.
    fn identity_key_pair(&self) -> &KeyPair;

    /// Local registration id.
    fn registration_id(&self) -> u32;

    /// Whether `identity_key` is trusted for `address`.
    ///
    /// Trust on first use is handled above this layer; every identity is
    /// accepted here.
    async fn is_trusted_identity(
        &self,
        _address: &ProtocolAddress,
        _identity_key: &[u8],
    ) -> Result<bool, StoreError> {
        Ok(true)
    }

    /// Sender-key record for `name`, if any.
    async fn load_sender_key(
        &self,
        name: &SenderKeyName,
    ) -> Result<Option<SenderKeyRecord>, StoreError>;

    /// Replace the sender-key record for `name`.
    async fn store_sender_key(
        &self,
        name: &SenderKeyName,
        record: &SenderKeyRecord,
    ) -> Result<(), StoreError>;
}

/// [`SignalStore`] backed by a [`KeyStore`] and the caller's credentials.
#[derive(Clone)]
pub struct SignalStorage<K: KeyStore> {
    keys: K,
    credentials: Arc<AuthCredentials>,
}

impl<K: KeyStore> SignalStorage<K> {
    /// Typed view of `keys`.
    pub fn new(keys: K, credentials: Arc<AuthCredentials>) -> Self {
        Self { keys, credentials }
    }

    /// Underlying key store.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Store a batch of one-time pre-keys.
    pub async fn store_pre_keys(&self, pre_keys: &[PreKey]) -> Result<(), StoreError> {
        let mut mutations = KeyMutations::new();
        for pre_key in pre_keys {
            mutations.insert(RecordKind::PreKey, pre_key.key_id.to_string(), Some(encode(pre_key)?));
        }
        self.keys.set(mutations).await
    }

    async fn get_one(&self, kind: RecordKind, id: String) -> Result<Option<Vec<u8>>, StoreError> {
        let mut found = self.keys.get(kind, std::slice::from_ref(&id)).await?;
        Ok(found.remove(&id))
    }

    async fn put_one(
        &self,
        kind: RecordKind,
        id: String,
        value: Option<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let mut mutations = KeyMutations::new();
        mutations.insert(kind, id, value);
        self.keys.set(mutations).await
    }
}

#[async_trait]
impl<K: KeyStore> SignalStore for SignalStorage<K> {
    async fn load_session(
        &self,
        address: &ProtocolAddress,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.get_one(RecordKind::Session, address.to_string()).await?.map(SessionRecord))
    }

    async fn store_session(
        &self,
        address: &ProtocolAddress,
        record: SessionRecord,
    ) -> Result<(), StoreError> {
        self.put_one(RecordKind::Session, address.to_string(), Some(record.into_bytes())).await
    }

    async fn load_pre_key(&self, key_id: u32) -> Result<Option<PreKey>, StoreError> {
        self.get_one(RecordKind::PreKey, key_id.to_string())
            .await?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn remove_pre_key(&self, key_id: u32) -> Result<(), StoreError> {
        self.put_one(RecordKind::PreKey, key_id.to_string(), None).await
    }

    fn signed_pre_key(&self) -> &SignedPreKey {
        &self.credentials.signed_pre_key
    }

    fn identity_key_pair(&self) -> &KeyPair {
        &self.credentials.identity_key
    }

    fn registration_id(&self) -> u32 {
        self.credentials.registration_id
    }

    async fn load_sender_key(
        &self,
        name: &SenderKeyName,
    ) -> Result<Option<SenderKeyRecord>, StoreError> {
        self.get_one(RecordKind::SenderKey, name.to_string())
            .await?
            .map(|bytes| {
                SenderKeyRecord::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn store_sender_key(
        &self,
        name: &SenderKeyName,
        record: &SenderKeyRecord,
    ) -> Result<(), StoreError> {
        let bytes = record.serialize().map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put_one(RecordKind::SenderKey, name.to_string(), Some(bytes)).await
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::de::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}
