//! Per-key exclusivity, submission ordering and commit conflicts.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{FakeCipher, SimEnv, connect, credentials, make_user};
use futures::future::join_all;
use sigkeep_core::{
    ChaoticKeyStore, ErrorKind, KeyMutations, KeyStore, MemoryKeyStore, MessageKind, RecordKind,
    RepositoryConfig, SessionError, SignalRepository, StoreError,
};

const ALICE: &str = "5511111111111@s.whatsapp.net";
const BOB: &str = "5522222222222@s.whatsapp.net";
const CAROL: &str = "5533333333333@s.whatsapp.net";

#[tokio::test]
async fn same_peer_operations_never_overlap() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 1).await;

    let repo = &alice.repository;
    let (a, b, c, d) = tokio::join!(
        repo.encrypt_message(BOB, b"1"),
        repo.encrypt_message(BOB, b"2"),
        repo.encrypt_message(BOB, b"3"),
        repo.encrypt_message(BOB, b"4"),
    );
    for result in [a, b, c, d] {
        result.unwrap();
    }

    assert_eq!(alice.cipher.overlaps(), 0);
    assert_eq!(alice.repository.transaction_stats().committed, 5);
}

#[tokio::test]
async fn same_peer_operations_run_in_submission_order() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 1).await;

    let repo = &alice.repository;
    let messages: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i]).collect();
    let results = join_all(messages.iter().map(|m| repo.encrypt_message(BOB, m))).await;
    assert!(results.iter().all(Result::is_ok));

    assert_eq!(alice.cipher.encrypt_log(), messages);
}

#[tokio::test]
async fn mixed_encrypt_and_decrypt_on_one_peer_are_serialized() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 1).await;

    let first = alice.repository.encrypt_message(BOB, b"first").await.unwrap();
    bob.repository.decrypt_message(ALICE, first.kind, &first.ciphertext).await.unwrap();
    let incoming = alice.repository.encrypt_message(BOB, b"second").await.unwrap();

    let repo = &bob.repository;
    let (reply, decrypted, again) = tokio::join!(
        repo.encrypt_message(ALICE, b"reply"),
        repo.decrypt_message(ALICE, incoming.kind, &incoming.ciphertext),
        repo.encrypt_message(ALICE, b"reply 2"),
    );

    assert_eq!(reply.unwrap().kind, MessageKind::Whisper);
    assert_eq!(decrypted.unwrap(), b"second");
    again.unwrap();
    assert_eq!(bob.cipher.overlaps(), 0);
}

#[tokio::test]
async fn different_peers_are_independent() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    let carol = make_user(3, CAROL);
    connect(&alice, &bob, 1).await;
    connect(&alice, &carol, 1).await;

    let repo = &alice.repository;
    let (to_bob, to_carol) =
        tokio::join!(repo.encrypt_message(BOB, b"b"), repo.encrypt_message(CAROL, b"c"));

    let to_bob = to_bob.unwrap();
    let to_carol = to_carol.unwrap();
    assert_eq!(
        bob.repository.decrypt_message(ALICE, to_bob.kind, &to_bob.ciphertext).await.unwrap(),
        b"b"
    );
    assert_eq!(
        carol.repository.decrypt_message(ALICE, to_carol.kind, &to_carol.ciphertext).await.unwrap(),
        b"c"
    );
}

#[tokio::test]
async fn concurrent_group_encryptions_share_one_chain() {
    let sender = make_user(1, "111@s.whatsapp.net");
    let receiver = make_user(2, "222@s.whatsapp.net");
    let group = "g@g.us";

    let repo = &sender.repository;
    let (a, b, c) = tokio::join!(
        repo.encrypt_group_message(group, &sender.jid, b"a"),
        repo.encrypt_group_message(group, &sender.jid, b"b"),
        repo.encrypt_group_message(group, &sender.jid, b"c"),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    receiver
        .repository
        .process_sender_key_distribution_message(group, &sender.jid, &a.distribution_message)
        .await
        .unwrap();
    for (enc, expected) in [(&a, b"a"), (&b, b"b"), (&c, b"c")] {
        let plaintext =
            receiver.repository.decrypt_group_message(group, &sender.jid, &enc.ciphertext).await.unwrap();
        assert_eq!(plaintext, expected);
    }
}

type ChaoticRepository = SignalRepository<ChaoticKeyStore<MemoryKeyStore>, FakeCipher, SimEnv>;

async fn chaotic_repository(
    failure_rate: f64,
    seed: u64,
) -> (ChaoticRepository, ChaoticKeyStore<MemoryKeyStore>, FakeCipher, SimEnv) {
    let bob = make_user(2, BOB);
    let bundle = bob.bundle(1).await;

    // Establish the session on a clean store first, then copy it under chaos.
    let seed_user = make_user(1, ALICE);
    seed_user.repository.inject_session(BOB, &bundle).await.unwrap();
    let session = seed_user.store.record(RecordKind::Session, "5522222222222.0").unwrap().unwrap();

    let backend = MemoryKeyStore::new();
    backend
        .set(KeyMutations::new().put(RecordKind::Session, "5522222222222.0", session))
        .await
        .unwrap();

    let store = ChaoticKeyStore::with_seed(backend, failure_rate, seed);
    let cipher = FakeCipher::new();
    let env = SimEnv::new(seed);
    let repository = SignalRepository::new(
        store.clone(),
        credentials(1),
        cipher.clone(),
        env.clone(),
        RepositoryConfig::default(),
    )
    .unwrap();

    (repository, store, cipher, env)
}

#[tokio::test]
async fn persistent_commit_conflict_fails_transaction() {
    let (repository, store, cipher, env) = chaotic_repository(1.0, 3).await;

    let err = repository.encrypt_message(BOB, b"never lands").await.unwrap_err();

    match &err {
        SessionError::TransactionFailed { key, attempts, source } => {
            assert_eq!(key, "peer:5522222222222.0");
            assert_eq!(*attempts, 6);
            assert!(matches!(source, StoreError::Conflict(_)));
        },
        other => panic!("expected TransactionFailed, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::TransactionFailed);

    // The whole operation is re-run for every commit attempt.
    assert_eq!(cipher.encrypt_log().len(), 6);
    assert_eq!(env.sleeps_ms(), vec![200; 5]);
    assert_eq!(store.injected_failures(), 6);
    assert_eq!(repository.transaction_stats().commit_failures, 6);
}

#[tokio::test]
async fn intermittent_conflicts_are_retried_transparently() {
    let (repository, store, _cipher, _env) = chaotic_repository(0.3, 11).await;

    for i in 0..10u8 {
        match repository.encrypt_message(BOB, &[i]).await {
            Ok(message) => assert_eq!(message.kind, MessageKind::PreKey),
            Err(SessionError::TransactionFailed { attempts, .. }) => assert_eq!(attempts, 6),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let stats = repository.transaction_stats();
    assert_eq!(stats.started, stats.committed + stats.commit_failures);
    assert_eq!(stats.commit_failures as usize, store.injected_failures());
}
