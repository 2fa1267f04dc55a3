//! Fault-injecting key store wrapper
//!
//! Wraps another [`KeyStore`] and randomly rejects batch writes with
//! [`StoreError::Conflict`], the way an optimistic backend rejects a commit
//! after a concurrent external change. Reads always pass through so the
//! retried unit of work sees the real state.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use super::{KeyMutations, KeyStore, RecordKind, StoreError};

/// Key store wrapper that injects commit conflicts.
///
/// Failures are decided by a seeded LCG, so a given seed always produces the
/// same conflict pattern.
#[derive(Clone)]
pub struct ChaoticKeyStore<S: KeyStore> {
    inner: S,
    /// Conflict rate (0.0 = never, 1.0 = every write)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
    injected: Arc<AtomicUsize>,
}

struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes LCG
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: KeyStore> ChaoticKeyStore<S> {
    /// Wrap `inner` with a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            injected: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total reads and writes attempted through this wrapper.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Number of writes rejected with an injected conflict.
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> Result<bool, StoreError> {
        let mut rng =
            self.rng.lock().map_err(|_| StoreError::Io("chaotic rng mutex poisoned".to_string()))?;
        Ok(rng.next() < self.failure_rate)
    }
}

#[async_trait]
impl<S: KeyStore> KeyStore for ChaoticKeyStore<S> {
    async fn get(
        &self,
        kind: RecordKind,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        self.operation_count.fetch_add(1, Ordering::SeqCst);
        self.inner.get(kind, ids).await
    }

    async fn set(&self, mutations: KeyMutations) -> Result<(), StoreError> {
        self.operation_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail()? {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict("chaotic failure injection".to_string()));
        }
        self.inner.set(mutations).await
    }
}
