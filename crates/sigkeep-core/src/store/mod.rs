//! Key-value storage abstraction
//!
//! The backend stores opaque byte records addressed by `(kind, id)`. Reads
//! return only the ids that exist; writes take a batch of mutations where
//! `None` deletes (tombstones) the record.

mod chaotic;
mod error;
mod memory;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
pub use chaotic::ChaoticKeyStore;
pub use error::StoreError;
pub use memory::MemoryKeyStore;

/// Record families held by the key store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// One-time pre-keys, keyed by pre-key id
    PreKey,
    /// Pairwise sessions, keyed by protocol address
    Session,
    /// Sender-key records, keyed by sender key name
    SenderKey,
}

impl RecordKind {
    /// Stable name used by backends.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreKey => "pre-key",
            Self::Session => "session",
            Self::SenderKey => "sender-key",
        }
    }
}

/// A batch of writes: `kind -> id -> Some(bytes) | None (delete)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMutations {
    entries: BTreeMap<RecordKind, BTreeMap<String, Option<Vec<u8>>>>,
}

impl KeyMutations {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` under `(kind, id)`.
    #[must_use]
    pub fn put(mut self, kind: RecordKind, id: impl Into<String>, value: Vec<u8>) -> Self {
        self.insert(kind, id.into(), Some(value));
        self
    }

    /// Delete `(kind, id)`.
    #[must_use]
    pub fn delete(mut self, kind: RecordKind, id: impl Into<String>) -> Self {
        self.insert(kind, id.into(), None);
        self
    }

    /// Insert or overwrite a single entry.
    pub fn insert(&mut self, kind: RecordKind, id: String, value: Option<Vec<u8>>) {
        self.entries.entry(kind).or_default().insert(id, value);
    }

    /// Merge `other` into `self`; later writes win.
    pub fn merge(&mut self, other: Self) {
        for (kind, ids) in other.entries {
            let target = self.entries.entry(kind).or_default();
            target.extend(ids);
        }
    }

    /// True if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// Number of entries across all kinds.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Iterate `(kind, id, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (RecordKind, &str, Option<&[u8]>)> {
        self.entries.iter().flat_map(|(kind, ids)| {
            ids.iter().map(move |(id, value)| (*kind, id.as_str(), value.as_deref()))
        })
    }
}

/// Storage backend for Signal key material.
///
/// Must be Clone (shared by the coordinator, transactions and the bypass
/// path), Send + Sync, and cheap to clone. Implementations typically share
/// internal state via Arc, so clones access the same underlying storage.
#[async_trait]
pub trait KeyStore: Clone + Send + Sync + 'static {
    /// Fetch records of one kind.
    ///
    /// The returned map contains only ids that exist. Missing ids are not an
    /// error.
    async fn get(
        &self,
        kind: RecordKind,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, StoreError>;

    /// Apply a batch of writes.
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if the backend observed a concurrent external
    ///   change; the caller may retry the whole unit of work
    async fn set(&self, mutations: KeyMutations) -> Result<(), StoreError>;
}
