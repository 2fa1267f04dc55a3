//! Per-key lock registry.
//!
//! One tokio mutex per conversation key, created on demand. Waiters queue in
//! FIFO order. The registry entry is removed once the last holder or waiter
//! lets go, so the map only contains keys with work in flight.

#![allow(clippy::disallowed_types, reason = "Registry map is never locked across an await")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::OwnedMutexGuard;

type Locks = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Registry of per-key async locks.
#[derive(Clone, Default)]
pub(crate) struct LockRegistry {
    locks: Arc<Mutex<Locks>>,
}

impl LockRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// If the returned future is dropped while waiting, the registry entry is
    /// cleaned up the same way as on release.
    pub(crate) async fn acquire(&self, key: &str) -> KeyGuard {
        let mut key_guard = KeyGuard { registry: self.clone(), key: key.to_string(), guard: None };
        let lock = {
            let mut locks = self.map();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        key_guard.guard = Some(lock.lock_owned().await);
        key_guard
    }

    /// Number of keys currently held or waited on.
    pub(crate) fn active_keys(&self) -> usize {
        self.map().len()
    }

    // Nothing panics while the map is locked, so a poisoned map is still
    // consistent.
    fn map(&self) -> MutexGuard<'_, Locks> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one key. Released on drop, including during unwinding
/// and when the owning future is cancelled.
///
/// `guard` is `None` only while the lock is still being waited for.
pub(crate) struct KeyGuard {
    registry: LockRegistry,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.registry.map();
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}
