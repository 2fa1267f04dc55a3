//! Shared harness for repository integration tests.
//!
//! - `SimEnv`: records sleeps instead of waiting, deterministic randomness
//! - `FakeCipher`: toy pairwise engine with real failure modes ("No session
//!   record", "Bad MAC"), pre-key consumption and overlap detection
//! - `TestUser`: a repository over an in-memory store with published keys

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sigkeep_core::{
    AuthCredentials, CiphertextMessage, EngineError, Environment, KeyPair, MemoryKeyStore,
    PreKey, PreKeyBundle, ProtocolAddress, RepositoryConfig, SessionCipher, SessionRecord,
    SignalRepository, SignalStorage, SignalStore, SignedPreKey, credentials::DJB_KEY_TYPE,
};

/// Simulated environment: sleeps are recorded and return immediately.
#[derive(Clone)]
pub struct SimEnv {
    sleeps: Arc<Mutex<Vec<Duration>>>,
    rng: Arc<Mutex<u64>>,
}

impl SimEnv {
    pub fn new(seed: u64) -> Self {
        Self { sleeps: Arc::new(Mutex::new(Vec::new())), rng: Arc::new(Mutex::new(seed)) }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn sleeps_ms(&self) -> Vec<u128> {
        self.sleeps().iter().map(Duration::as_millis).collect()
    }
}

impl Environment for SimEnv {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.sleeps.lock().unwrap().push(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut state = self.rng.lock().unwrap();
        for byte in buffer.iter_mut() {
            *state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            *byte = (*state >> 33) as u8;
        }
    }
}

const MAC_LEN: usize = 8;
const SESSION_LEN: usize = 37;

/// Toy pairwise engine.
///
/// Session record: `key (32) || pending pre-key flag (1) || pre-key id (4)`.
/// A pre-key message is `sender identity (33, type-prefixed) || pre-key id (4) || sealed`,
/// a whisper message is just `sealed`, where `sealed` is the XOR-encrypted
/// payload followed by an 8-byte MAC.
#[derive(Clone, Default)]
pub struct FakeCipher {
    inner: Arc<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
    in_flight: Mutex<HashMap<String, usize>>,
    overlaps: AtomicUsize,
    encrypt_log: Mutex<Vec<Vec<u8>>>,
    decrypt_attempts: AtomicUsize,
    forced_error: Mutex<Option<String>>,
}

impl FakeCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every decrypt fail with `message`.
    pub fn fail_decrypts_with(&self, message: &str) {
        *self.inner.forced_error.lock().unwrap() = Some(message.to_string());
    }

    /// Times two operations on the same address were inside the engine at once.
    pub fn overlaps(&self) -> usize {
        self.inner.overlaps.load(Ordering::SeqCst)
    }

    /// Plaintexts in the order the engine encrypted them.
    pub fn encrypt_log(&self) -> Vec<Vec<u8>> {
        self.inner.encrypt_log.lock().unwrap().clone()
    }

    pub fn decrypt_attempts(&self) -> usize {
        self.inner.decrypt_attempts.load(Ordering::SeqCst)
    }

    /// Hold the address "open" across a few scheduler turns so that an
    /// unserialized concurrent operation would be observed.
    async fn mutation_window(&self, address: &ProtocolAddress) {
        let key = address.to_string();
        {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            let count = in_flight.entry(key.clone()).or_default();
            *count += 1;
            if *count > 1 {
                self.inner.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }

        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let mut in_flight = self.inner.in_flight.lock().unwrap();
        if let Some(count) = in_flight.get_mut(&key) {
            *count -= 1;
        }
    }

    fn forced_error(&self) -> Option<EngineError> {
        self.inner.forced_error.lock().unwrap().clone().map(EngineError::Protocol)
    }
}

fn session_key(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(b"fake-session");
    hasher.update(low);
    hasher.update(high);
    hasher.finalize().into()
}

fn keystream_xor(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    data.chunks(32)
        .enumerate()
        .flat_map(|(block, chunk)| {
            let mut hasher = Sha256::new();
            hasher.update(key);
            hasher.update((block as u32).to_be_bytes());
            let pad: [u8; 32] = hasher.finalize().into();
            chunk.iter().zip(pad).map(|(b, p)| b ^ p).collect::<Vec<_>>()
        })
        .collect()
}

fn mac(key: &[u8; 32], body: &[u8]) -> [u8; MAC_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"mac");
    hasher.update(key);
    hasher.update(body);
    let digest = hasher.finalize();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&digest[..MAC_LEN]);
    out
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let mut body = keystream_xor(key, plaintext);
    let tag = mac(key, &body);
    body.extend_from_slice(&tag);
    body
}

fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, EngineError> {
    if sealed.len() < MAC_LEN {
        return Err(EngineError::protocol("Bad MAC"));
    }
    let (body, tag) = sealed.split_at(sealed.len() - MAC_LEN);
    if mac(key, body) != tag {
        return Err(EngineError::protocol("Bad MAC"));
    }
    Ok(keystream_xor(key, body))
}

struct FakeSession {
    key: [u8; 32],
    pending_pre_key: bool,
    pre_key_id: u32,
}

impl FakeSession {
    fn encode(&self) -> SessionRecord {
        let mut bytes = self.key.to_vec();
        bytes.push(u8::from(self.pending_pre_key));
        bytes.extend_from_slice(&self.pre_key_id.to_be_bytes());
        SessionRecord::new(bytes)
    }

    fn decode(record: &SessionRecord) -> Result<Self, EngineError> {
        let bytes = record.as_bytes();
        if bytes.len() != SESSION_LEN {
            return Err(EngineError::protocol("Bad MAC Error: corrupt session record"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[33..]);
        Ok(Self { key, pending_pre_key: bytes[32] == 1, pre_key_id: u32::from_be_bytes(id) })
    }
}

async fn load(
    store: &dyn SignalStore,
    address: &ProtocolAddress,
) -> Result<Option<FakeSession>, EngineError> {
    store.load_session(address).await?.map(|record| FakeSession::decode(&record)).transpose()
}

#[async_trait]
impl SessionCipher for FakeCipher {
    async fn encrypt(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, EngineError> {
        let session = load(store, address)
            .await?
            .ok_or_else(|| EngineError::protocol(format!("No session record for {address}")))?;

        self.mutation_window(address).await;
        self.inner.encrypt_log.lock().unwrap().push(plaintext.to_vec());

        let sealed = seal(&session.key, plaintext);
        let message = if session.pending_pre_key {
            let mut body = store.identity_key_pair().signal_public_key().to_vec();
            body.extend_from_slice(&session.pre_key_id.to_be_bytes());
            body.extend_from_slice(&sealed);
            CiphertextMessage { message_type: 3, body }
        } else {
            CiphertextMessage { message_type: 1, body: sealed }
        };

        store.store_session(address, session.encode()).await?;
        Ok(message)
    }

    async fn decrypt_pre_key_message(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.inner.decrypt_attempts.fetch_add(1, Ordering::SeqCst);
        self.mutation_window(address).await;
        if let Some(err) = self.forced_error() {
            return Err(err);
        }

        if ciphertext.len() < 37 {
            return Err(EngineError::protocol("Invalid PreKeyWhisperMessage"));
        }
        if ciphertext[0] != DJB_KEY_TYPE {
            return Err(EngineError::protocol("Bad key type"));
        }
        let mut sender_identity = [0u8; 32];
        sender_identity.copy_from_slice(&ciphertext[1..33]);
        let mut id = [0u8; 4];
        id.copy_from_slice(&ciphertext[33..37]);
        let pre_key_id = u32::from_be_bytes(id);
        let sealed = &ciphertext[37..];

        if let Some(session) = load(store, address).await? {
            return open(&session.key, sealed);
        }

        if store.load_pre_key(pre_key_id).await?.is_none() {
            return Err(EngineError::protocol(format!("Invalid PreKey ID {pre_key_id}")));
        }
        let key = session_key(&store.identity_key_pair().public, &sender_identity);
        let plaintext = open(&key, sealed)?;

        let session = FakeSession { key, pending_pre_key: false, pre_key_id: 0 };
        store.store_session(address, session.encode()).await?;
        store.remove_pre_key(pre_key_id).await?;
        Ok(plaintext)
    }

    async fn decrypt_message(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.inner.decrypt_attempts.fetch_add(1, Ordering::SeqCst);
        self.mutation_window(address).await;
        if let Some(err) = self.forced_error() {
            return Err(err);
        }

        let session = load(store, address)
            .await?
            .ok_or_else(|| EngineError::protocol("No session record"))?;
        let plaintext = open(&session.key, ciphertext)?;
        store.store_session(address, session.encode()).await?;
        Ok(plaintext)
    }

    async fn init_outgoing(
        &self,
        store: &dyn SignalStore,
        address: &ProtocolAddress,
        bundle: &PreKeyBundle,
    ) -> Result<(), EngineError> {
        self.mutation_window(address).await;

        let key = session_key(&store.identity_key_pair().public, &bundle.identity_key);
        let session = FakeSession {
            key,
            pending_pre_key: true,
            pre_key_id: bundle.pre_key.map_or(0, |(id, _)| id),
        };
        Ok(store.store_session(address, session.encode()).await?)
    }
}

pub type TestRepository = SignalRepository<MemoryKeyStore, FakeCipher, SimEnv>;

/// One participant: repository plus handles for inspection.
pub struct TestUser {
    pub jid: String,
    pub repository: TestRepository,
    pub store: MemoryKeyStore,
    pub cipher: FakeCipher,
    pub env: SimEnv,
    credentials: Arc<AuthCredentials>,
}

pub fn credentials(seed: u8) -> AuthCredentials {
    AuthCredentials {
        registration_id: u32::from(seed),
        identity_key: KeyPair::new([seed; 32], [seed ^ 0xFF; 32]),
        signed_pre_key: SignedPreKey {
            key_id: 1,
            key_pair: KeyPair::new([seed.wrapping_add(1); 32], [seed.wrapping_add(2); 32]),
            signature: vec![seed; 64],
        },
    }
}

pub fn make_user(seed: u8, jid: &str) -> TestUser {
    make_user_with(seed, jid, RepositoryConfig::default())
}

pub fn make_user_with(seed: u8, jid: &str, config: RepositoryConfig) -> TestUser {
    let store = MemoryKeyStore::new();
    let cipher = FakeCipher::new();
    let env = SimEnv::new(u64::from(seed));
    let credentials = credentials(seed);
    let repository =
        SignalRepository::new(store.clone(), credentials.clone(), cipher.clone(), env.clone(), config)
            .expect("valid config");

    TestUser {
        jid: jid.to_string(),
        repository,
        store,
        cipher,
        env,
        credentials: Arc::new(credentials),
    }
}

impl TestUser {
    /// Publish one-time pre-key `id` and return the bundle a peer would fetch.
    pub async fn bundle(&self, pre_key_id: u32) -> PreKeyBundle {
        let pre_key = PreKey { key_id: pre_key_id, key_pair: KeyPair::new([7; 32], [8; 32]) };
        SignalStorage::new(self.store.clone(), Arc::clone(&self.credentials))
            .store_pre_keys(&[pre_key.clone()])
            .await
            .unwrap();

        PreKeyBundle {
            registration_id: self.credentials.registration_id,
            device_id: 0,
            identity_key: self.credentials.identity_key.public,
            signed_pre_key_id: self.credentials.signed_pre_key.key_id,
            signed_pre_key: self.credentials.signed_pre_key.key_pair.public,
            signed_pre_key_signature: self.credentials.signed_pre_key.signature.clone(),
            pre_key: Some((pre_key.key_id, pre_key.key_pair.public)),
        }
    }

    pub fn signal_storage(&self) -> SignalStorage<MemoryKeyStore> {
        SignalStorage::new(self.store.clone(), Arc::clone(&self.credentials))
    }
}

/// Establish a session from `from` to `to` using one of `to`'s pre-keys.
pub async fn connect(from: &TestUser, to: &TestUser, pre_key_id: u32) {
    let bundle = to.bundle(pre_key_id).await;
    from.repository.inject_session(&to.jid, &bundle).await.unwrap();
}
