//! Session clearing.

use std::sync::atomic::{AtomicU64, Ordering};

use super::classify::{Classification, FailureKind};
use crate::{
    address::ProtocolAddress,
    store::{KeyMutations, KeyStore, RecordKind},
    transaction::Transaction,
};

/// Clears broken pairwise sessions so the next attempt starts sessionless.
#[derive(Debug, Default)]
pub struct SessionRecovery {
    invocations: AtomicU64,
}

impl SessionRecovery {
    /// New engine with a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tombstone the session for `address` if `classification` calls for it.
    ///
    /// The tombstone is written through to the backend, so it persists even
    /// if the surrounding operation ultimately fails. A failed write is
    /// logged and otherwise ignored. Returns true if the session was cleared.
    pub async fn recover<S: KeyStore>(
        &self,
        txn: &Transaction<S>,
        address: &ProtocolAddress,
        classification: Classification,
    ) -> bool {
        if !matches!(classification.kind, FailureKind::MacError | FailureKind::SessionRecordError) {
            return false;
        }
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let tombstone = KeyMutations::new().delete(RecordKind::Session, address.to_string());
        match txn.write_through(tombstone).await {
            Ok(()) => {
                tracing::info!(
                    address = %address,
                    kind = ?classification.kind,
                    "Cleared session for recovery"
                );
                true
            },
            Err(e) => {
                tracing::warn!(
                    address = %address,
                    error = %e,
                    "Failed to clear session during recovery"
                );
                false
            },
        }
    }

    /// Number of recoveries attempted.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}
