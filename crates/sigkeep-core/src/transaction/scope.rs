//! Transaction handle: read cache plus buffered writes.

#![allow(clippy::disallowed_types, reason = "Cache and buffer are never locked across an await")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::store::{KeyMutations, KeyStore, RecordKind, StoreError};

type Cache = HashMap<(RecordKind, String), Option<Vec<u8>>>;

struct Inner<S> {
    store: S,
    /// Everything read or written so far; `None` means known absent
    cache: Mutex<Cache>,
    /// Writes not yet sent to the backend
    pending: Mutex<KeyMutations>,
}

/// View of the key store inside one exclusive scope.
///
/// Reads go to the backend once per id and are served from the cache after
/// that. Writes land in the cache and a pending batch; nothing reaches the
/// backend until [`Transaction::commit`], except
/// [`Transaction::write_through`]. Clones share the same view.
pub struct Transaction<S: KeyStore> {
    inner: Arc<Inner<S>>,
}

impl<S: KeyStore> Clone for Transaction<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: KeyStore> Transaction<S> {
    pub(crate) fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cache: Mutex::new(HashMap::new()),
                pending: Mutex::new(KeyMutations::new()),
            }),
        }
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Send the buffered batch to the backend.
    ///
    /// The buffer is cleared before the write, so a failed commit leaves
    /// nothing behind for a second call to replay.
    pub(crate) async fn commit(&self) -> Result<(), StoreError> {
        let pending = std::mem::take(&mut *lock(&self.inner.pending));
        if pending.is_empty() {
            return Ok(());
        }
        self.inner.store.set(pending).await
    }

    /// Persist `mutations` immediately and reflect them in this view.
    ///
    /// The writes are also buffered, so they override anything written
    /// earlier in the transaction and survive a later commit.
    pub async fn write_through(&self, mutations: KeyMutations) -> Result<(), StoreError> {
        self.inner.store.set(mutations.clone()).await?;
        self.buffer(mutations);
        Ok(())
    }

    fn buffer(&self, mutations: KeyMutations) {
        {
            let mut cache = lock(&self.inner.cache);
            for (kind, id, value) in mutations.iter() {
                cache.insert((kind, id.to_string()), value.map(<[u8]>::to_vec));
            }
        }
        lock(&self.inner.pending).merge(mutations);
    }

    fn cached(&self, kind: RecordKind, ids: &[String]) -> (HashMap<String, Vec<u8>>, Vec<String>) {
        let cache = lock(&self.inner.cache);
        let mut found = HashMap::new();
        let mut missing = Vec::new();

        for id in ids {
            match cache.get(&(kind, id.clone())) {
                Some(Some(value)) => {
                    found.insert(id.clone(), value.clone());
                },
                Some(None) => {},
                None => missing.push(id.clone()),
            }
        }

        (found, missing)
    }

    fn remember(&self, kind: RecordKind, ids: &[String], fetched: &HashMap<String, Vec<u8>>) {
        let mut cache = lock(&self.inner.cache);
        for id in ids {
            // A write that landed while the fetch was in flight wins.
            cache.entry((kind, id.clone())).or_insert_with(|| fetched.get(id).cloned());
        }
    }
}

#[async_trait]
impl<S: KeyStore> KeyStore for Transaction<S> {
    async fn get(
        &self,
        kind: RecordKind,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let (mut found, missing) = self.cached(kind, ids);
        if missing.is_empty() {
            return Ok(found);
        }

        let fetched = self.inner.store.get(kind, &missing).await?;
        self.remember(kind, &missing, &fetched);
        found.extend(fetched);
        Ok(found)
    }

    async fn set(&self, mutations: KeyMutations) -> Result<(), StoreError> {
        self.buffer(mutations);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
