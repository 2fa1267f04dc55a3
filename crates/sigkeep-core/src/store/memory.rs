//! In-memory key store.
//!
//! Records live in one map behind a std mutex. Batches are applied under a
//! single lock acquisition, so readers never observe half a batch.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::{KeyMutations, KeyStore, RecordKind, StoreError};

type Records = HashMap<(RecordKind, String), Vec<u8>>;

/// In-memory key store for testing and embedding.
///
/// All state is wrapped in `Arc<Mutex<>>` so clones share the same records.
/// The lock is never held across an await point. A batch from `set` is
/// applied atomically under one lock acquisition.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    inner: Arc<Mutex<Records>>,
}

impl MemoryKeyStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all kinds.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    /// True if no record is stored.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    /// Read a single record without going through the async API.
    pub fn record(&self, kind: RecordKind, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.get(&(kind, id.to_string())).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("memory store mutex poisoned".to_string()))
    }

    fn read(&self, kind: RecordKind, ids: &[String]) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let records = self.lock()?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                records.get(&(kind, id.clone())).map(|value| (id.clone(), value.clone()))
            })
            .collect())
    }

    fn apply(&self, mutations: &KeyMutations) -> Result<(), StoreError> {
        let mut records = self.lock()?;

        for (kind, id, value) in mutations.iter() {
            match value {
                Some(bytes) => {
                    records.insert((kind, id.to_string()), bytes.to_vec());
                },
                None => {
                    records.remove(&(kind, id.to_string()));
                },
            }
        }

        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(
        &self,
        kind: RecordKind,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        self.read(kind, ids)
    }

    async fn set(&self, mutations: KeyMutations) -> Result<(), StoreError> {
        self.apply(&mutations)
    }
}
