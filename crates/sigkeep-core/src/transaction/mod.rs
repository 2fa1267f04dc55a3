//! Transaction coordinator
//!
//! Every mutation of Signal state happens inside [`TransactionCoordinator::run_exclusive`]:
//!
//! 1. Wait for the conversation key's lock (FIFO per key)
//! 2. Run the operation against a fresh [`Transaction`]
//! 3. Operation error: drop the buffered writes and return the error
//! 4. Commit the buffered writes in one batch
//! 5. Retryable commit error: sleep, go to 2 with a fresh transaction
//!
//! The key stays locked across commit retries, so a retried operation still
//! never overlaps another operation on the same key.

mod lock;
mod scope;

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use lock::LockRegistry;
pub use scope::Transaction;

use crate::{
    address::ConversationKey, env::Environment, error::SessionError, store::KeyStore,
};

/// Snapshot of coordinator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    /// Transactions started (one per attempt)
    pub started: u64,
    /// Transactions committed
    pub committed: u64,
    /// Commits that failed
    pub commit_failures: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    committed: AtomicU64,
    commit_failures: AtomicU64,
}

/// Serializes work per conversation key and commits it atomically.
pub struct TransactionCoordinator<S: KeyStore, E: Environment> {
    store: S,
    env: E,
    locks: LockRegistry,
    max_commit_retries: u32,
    commit_retry_delay: Duration,
    counters: Arc<Counters>,
}

impl<S: KeyStore, E: Environment> TransactionCoordinator<S, E> {
    /// Coordinator over `store`.
    ///
    /// A failed commit is retried up to `max_commit_retries` times, waiting
    /// `commit_retry_delay` before each retry.
    pub fn new(store: S, env: E, max_commit_retries: u32, commit_retry_delay: Duration) -> Self {
        Self {
            store,
            env,
            locks: LockRegistry::new(),
            max_commit_retries,
            commit_retry_delay,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Backend the transactions commit to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `operation` with exclusive access to everything scoped to `key`.
    ///
    /// The operation may run more than once if commits fail; each run gets a
    /// fresh transaction.
    ///
    /// # Errors
    ///
    /// - Any error returned by `operation`, unchanged
    /// - `SessionError::TransactionFailed` when the commit fails with a
    ///   non-retryable error or keeps failing after all retries
    pub async fn run_exclusive<T, F, Fut>(
        &self,
        key: &ConversationKey,
        mut operation: F,
    ) -> Result<T, SessionError>
    where
        F: FnMut(Transaction<S>) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let key = key.to_string();
        let _guard = self.locks.acquire(&key).await;

        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            self.counters.started.fetch_add(1, Ordering::Relaxed);

            let txn = Transaction::new(self.store.clone());
            let value = operation(txn.clone()).await?;

            let pending = txn.pending_writes();
            match txn.commit().await {
                Ok(()) => {
                    self.counters.committed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, attempts, writes = pending, "Transaction committed");
                    return Ok(value);
                },
                Err(err) => {
                    self.counters.commit_failures.fetch_add(1, Ordering::Relaxed);

                    if !err.is_retryable() || attempts > self.max_commit_retries {
                        tracing::error!(
                            key = %key,
                            attempts,
                            error = %err,
                            "Transaction commit failed"
                        );
                        return Err(SessionError::TransactionFailed { key, attempts, source: err });
                    }

                    tracing::warn!(
                        key = %key,
                        attempt = attempts,
                        error = %err,
                        "Commit failed, retrying transaction"
                    );
                    self.env.sleep(self.commit_retry_delay).await;
                },
            }
        }
    }

    /// Current counter values.
    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            started: self.counters.started.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            commit_failures: self.counters.commit_failures.load(Ordering::Relaxed),
        }
    }

    /// Number of conversation keys with work in flight.
    pub fn active_keys(&self) -> usize {
        self.locks.active_keys()
    }
}
