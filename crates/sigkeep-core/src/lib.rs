//! Sigkeep Session Repository
//!
//! Reliable, concurrency-safe storage and use of Signal protocol sessions.
//!
//! # Architecture
//!
//! ```text
//! SignalRepository
//!   ├─ TransactionCoordinator   one exclusive scope per conversation key
//!   │    └─ Transaction          read cache + buffered writes over a KeyStore
//!   ├─ SessionCipher            external pairwise engine (Double Ratchet)
//!   ├─ recovery                 classify → clear session → back off → retry
//!   └─ group                    sender-key records and distribution messages
//! ```
//!
//! # Invariants
//!
//! - State scoped to a conversation key is only mutated inside a transaction
//!   holding that key; operations on one key run one at a time, in
//!   submission order
//! - A transaction's writes reach the backend in a single batch, or not at
//!   all. Session tombstones written by recovery are the one exception and
//!   persist immediately.
//! - A cleared session makes the peer sessionless, never broken

pub mod address;
pub mod cipher;
pub mod config;
pub mod credentials;
pub mod env;
pub mod error;
pub mod group;
pub mod recovery;
pub mod repository;
pub mod signal_store;
pub mod store;
pub mod transaction;

pub use address::{AddressError, ConversationKey, ProtocolAddress, SenderKeyName};
pub use cipher::{
    CiphertextMessage, EncryptedMessage, MessageKind, PREKEY_MESSAGE_TYPE, ParseMessageKindError,
    SessionCipher,
};
pub use config::RepositoryConfig;
pub use credentials::{AuthCredentials, KeyPair, PreKey, PreKeyBundle, SignedPreKey};
pub use env::{Environment, SystemEnv};
pub use error::{EngineError, ErrorKind, SessionError};
pub use group::GroupEncryption;
pub use recovery::{
    BackoffPolicy, BypassRule, Classification, ClassificationRule, ClassificationTable,
    ErrorClassifier, ExponentialBackoff, FailureKind, RetryDecision, RetryPolicy, SessionRecovery,
    SyncBypass,
};
pub use repository::SignalRepository;
pub use signal_store::{SessionRecord, SignalStorage, SignalStore};
pub use store::{ChaoticKeyStore, KeyMutations, KeyStore, MemoryKeyStore, RecordKind, StoreError};
pub use transaction::{Transaction, TransactionCoordinator, TransactionStats};
