//! Signal session repository.
//!
//! The public entry point. Every operation resolves its jid arguments, picks
//! a conversation key and runs inside [`TransactionCoordinator::run_exclusive`]
//! for that key. The only exception is a pairwise decrypt from a bypassed
//! (system or sync) jid, which makes a single attempt straight against the
//! backend.

use std::sync::Arc;

use crate::{
    address::{ConversationKey, ProtocolAddress, SenderKeyName},
    cipher::{EncryptedMessage, MessageKind, SessionCipher},
    config::RepositoryConfig,
    credentials::{AuthCredentials, PreKeyBundle},
    env::Environment,
    error::{EngineError, SessionError},
    group::{self, GroupEncryption},
    recovery::{
        Classification, ClassificationTable, ErrorClassifier, FailureKind, RetryDecision,
        RetryPolicy, SessionRecovery, SyncBypass,
    },
    signal_store::{SignalStorage, SignalStore},
    store::KeyStore,
    transaction::{Transaction, TransactionCoordinator, TransactionStats},
};

/// Transactional Signal session repository.
///
/// Generic over the key-value backend `S`, the pairwise cipher engine `C`
/// and the environment `E` (sleeping and randomness).
pub struct SignalRepository<S: KeyStore, C: SessionCipher, E: Environment> {
    coordinator: TransactionCoordinator<S, E>,
    credentials: Arc<AuthCredentials>,
    cipher: C,
    env: E,
    classifier: Box<dyn ErrorClassifier>,
    retry: RetryPolicy,
    recovery: SessionRecovery,
    bypass: SyncBypass,
    config: RepositoryConfig,
}

impl<S: KeyStore, C: SessionCipher, E: Environment> SignalRepository<S, C, E> {
    /// Repository over `store` with the default classifier and bypass rules.
    ///
    /// # Errors
    ///
    /// - `SessionError::Config` if `config` fails validation
    pub fn new(
        store: S,
        credentials: AuthCredentials,
        cipher: C,
        env: E,
        config: RepositoryConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        Ok(Self {
            coordinator: TransactionCoordinator::new(
                store,
                env.clone(),
                config.max_commit_retries,
                config.commit_retry_delay(),
            ),
            credentials: Arc::new(credentials),
            cipher,
            env,
            classifier: Box::new(ClassificationTable::default()),
            retry: config.retry_policy(),
            recovery: SessionRecovery::new(),
            bypass: SyncBypass::default(),
            config,
        })
    }

    /// Replace the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Replace the sync bypass rules.
    #[must_use]
    pub fn with_bypass(mut self, bypass: SyncBypass) -> Self {
        self.bypass = bypass;
        self
    }

    /// Replace the recovery retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Encrypt `plaintext` for the device named by `jid`.
    pub async fn encrypt_message(
        &self,
        jid: &str,
        plaintext: &[u8],
    ) -> Result<EncryptedMessage, SessionError> {
        let address = ProtocolAddress::from_jid(jid)?;

        self.coordinator
            .run_exclusive(&ConversationKey::Peer(address.clone()), |txn| {
                let address = &address;
                async move {
                    let store = self.storage(txn);
                    let message = self
                        .cipher
                        .encrypt(&store, address, plaintext)
                        .await
                        .map_err(|e| self.engine_error(address, e))?;
                    Ok(EncryptedMessage::from(message))
                }
            })
            .await
    }

    /// Decrypt a pairwise message from `jid`.
    ///
    /// Recoverable failures (missing session, bad MAC) clear the session and
    /// retry with exponential backoff. Once retries run out the last error
    /// is returned. Jids matched by the bypass rules get one attempt outside
    /// any transaction and no recovery.
    pub async fn decrypt_message(
        &self,
        jid: &str,
        kind: MessageKind,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let address = ProtocolAddress::from_jid(jid)?;

        if self.bypass.applies(jid) {
            tracing::debug!(jid, "Bypassing transaction and recovery for sync conversation");
            let store = SignalStorage::new(self.coordinator.store().clone(), self.credentials());
            return self
                .decrypt_once(&store, &address, kind, ciphertext)
                .await
                .map_err(|e| self.engine_error(&address, e));
        }

        self.coordinator
            .run_exclusive(&ConversationKey::Peer(address.clone()), |txn| {
                let address = &address;
                async move { self.decrypt_with_recovery(txn, address, kind, ciphertext).await }
            })
            .await
    }

    /// Encrypt `plaintext` for `group` with our own sender key.
    ///
    /// Creates the sender key on first use. The returned distribution message
    /// lets any member who processes it decrypt this and later messages.
    pub async fn encrypt_group_message(
        &self,
        group: &str,
        self_jid: &str,
        plaintext: &[u8],
    ) -> Result<GroupEncryption, SessionError> {
        let name = sender_key_name(group, self_jid)?;

        self.coordinator
            .run_exclusive(&ConversationKey::Group(group.to_string()), |txn| {
                let name = &name;
                async move {
                    let store = self.storage(txn);
                    group::encrypt(&store, &self.env, name, plaintext).await
                }
            })
            .await
    }

    /// Install `author_jid`'s sender key for `group`.
    ///
    /// Processing the same distribution message twice is a no-op.
    pub async fn process_sender_key_distribution_message(
        &self,
        group: &str,
        author_jid: &str,
        distribution: &[u8],
    ) -> Result<(), SessionError> {
        let name = sender_key_name(group, author_jid)?;

        self.coordinator
            .run_exclusive(&ConversationKey::Group(group.to_string()), |txn| {
                let name = &name;
                async move {
                    let store = self.storage(txn);
                    group::process(&store, name, distribution).await.map(|_| ())
                }
            })
            .await
    }

    /// Decrypt a group message sent by `author_jid`.
    ///
    /// # Errors
    ///
    /// - `SessionError::MissingDistributionState` if the author's sender key
    ///   was never processed
    pub async fn decrypt_group_message(
        &self,
        group: &str,
        author_jid: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let name = sender_key_name(group, author_jid)?;

        self.coordinator
            .run_exclusive(&ConversationKey::Group(group.to_string()), |txn| {
                let name = &name;
                async move {
                    let store = self.storage(txn);
                    group::decrypt(&store, name, ciphertext).await
                }
            })
            .await
    }

    /// Start an outgoing session with `jid` from its published key bundle.
    pub async fn inject_session(&self, jid: &str, bundle: &PreKeyBundle) -> Result<(), SessionError> {
        let address = ProtocolAddress::from_jid(jid)?;

        self.coordinator
            .run_exclusive(&ConversationKey::Peer(address.clone()), |txn| {
                let address = &address;
                async move {
                    let store = self.storage(txn);
                    self.cipher
                        .init_outgoing(&store, address, bundle)
                        .await
                        .map_err(|e| self.engine_error(address, e))
                }
            })
            .await
    }

    /// Session record id (`user.device`) for `jid`.
    pub fn address_for(&self, jid: &str) -> Result<String, SessionError> {
        Ok(ProtocolAddress::from_jid(jid)?.to_string())
    }

    /// Coordinator counters.
    pub fn transaction_stats(&self) -> TransactionStats {
        self.coordinator.stats()
    }

    /// Number of session recoveries attempted.
    pub fn recovery_count(&self) -> u64 {
        self.recovery.invocations()
    }

    /// Active configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Backend store.
    pub fn store(&self) -> &S {
        self.coordinator.store()
    }

    fn credentials(&self) -> Arc<AuthCredentials> {
        Arc::clone(&self.credentials)
    }

    fn storage(&self, txn: Transaction<S>) -> SignalStorage<Transaction<S>> {
        SignalStorage::new(txn, self.credentials())
    }

    async fn decrypt_once(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        kind: MessageKind,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        match kind {
            MessageKind::PreKey => {
                self.cipher.decrypt_pre_key_message(store, address, ciphertext).await
            },
            MessageKind::Whisper => self.cipher.decrypt_message(store, address, ciphertext).await,
        }
    }

    async fn decrypt_with_recovery(
        &self,
        txn: Transaction<S>,
        address: &ProtocolAddress,
        kind: MessageKind,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let store = self.storage(txn.clone());
        let max_attempts = self.retry.max_retries() + 1;
        let mut attempt = 0;

        loop {
            let err = match self.decrypt_once(&store, address, kind, ciphertext).await {
                Ok(plaintext) => return Ok(plaintext),
                Err(err) => err,
            };

            let classification = self.classifier.classify(&err);
            match self.retry.decide(attempt, classification) {
                RetryDecision::Fail => {
                    if classification.recoverable {
                        tracing::warn!(
                            address = %address,
                            attempts = attempt + 1,
                            error = %err,
                            "Session recovery exhausted"
                        );
                    }
                    return Err(into_session_error(address, err, classification));
                },
                RetryDecision::Retry { delay } => {
                    tracing::warn!(
                        address = %address,
                        attempt = attempt + 1,
                        max_attempts,
                        kind = ?classification.kind,
                        error = %err,
                        "Recoverable decrypt failure"
                    );
                    self.recovery.recover(&txn, address, classification).await;
                    self.env.sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }

    fn engine_error(&self, address: &ProtocolAddress, err: EngineError) -> SessionError {
        let classification = self.classifier.classify(&err);
        into_session_error(address, err, classification)
    }
}

fn into_session_error(
    address: &ProtocolAddress,
    err: EngineError,
    classification: Classification,
) -> SessionError {
    match classification.kind {
        FailureKind::MacError => SessionError::Mac { address: address.to_string(), source: err },
        FailureKind::SessionRecordError => {
            SessionError::SessionRecord { address: address.to_string(), source: err }
        },
        FailureKind::Other => SessionError::from(err),
    }
}

fn sender_key_name(group: &str, jid: &str) -> Result<SenderKeyName, SessionError> {
    if group.is_empty() {
        return Err(SessionError::MissingGroupId);
    }
    Ok(SenderKeyName::from_jid(group, jid)?)
}
