//! Pairwise encrypt, decrypt and session injection through the repository.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{connect, credentials, make_user};
use sigkeep_core::{
    EngineError, ErrorKind, KeyMutations, KeyStore, MessageKind, RecordKind, SessionError,
    SignalStore,
};

const ALICE: &str = "5511111111111@s.whatsapp.net";
const BOB: &str = "5522222222222:3@s.whatsapp.net";

#[tokio::test]
async fn pre_key_message_round_trip() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 31).await;

    let encrypted = alice.repository.encrypt_message(BOB, b"hello bob").await.unwrap();
    assert_eq!(encrypted.kind, MessageKind::PreKey);
    assert_eq!(encrypted.kind.as_str(), "pkmsg");

    let plaintext =
        bob.repository.decrypt_message(ALICE, encrypted.kind, &encrypted.ciphertext).await.unwrap();
    assert_eq!(plaintext, b"hello bob");
}

#[tokio::test]
async fn pre_key_message_carries_prefixed_identity() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 31).await;

    let encrypted = alice.repository.encrypt_message(BOB, b"hello bob").await.unwrap();
    let identity = credentials(1).identity_key.signal_public_key();
    assert_eq!(encrypted.ciphertext[..33], identity);

    let mut wrong_type = encrypted.ciphertext.clone();
    wrong_type[0] = 0x06;
    let err = bob.repository.decrypt_message(ALICE, encrypted.kind, &wrong_type).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(err.engine_error(), Some(&EngineError::protocol("Bad key type")));
    assert!(bob.store.record(RecordKind::PreKey, "31").unwrap().is_some());
}

#[tokio::test]
async fn pre_key_is_consumed_and_session_stored() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 31).await;
    assert!(bob.store.record(RecordKind::PreKey, "31").unwrap().is_some());

    let encrypted = alice.repository.encrypt_message(BOB, b"hi").await.unwrap();
    bob.repository.decrypt_message(ALICE, encrypted.kind, &encrypted.ciphertext).await.unwrap();

    assert_eq!(bob.store.record(RecordKind::PreKey, "31").unwrap(), None);
    assert!(bob.store.record(RecordKind::Session, "5511111111111.0").unwrap().is_some());
}

#[tokio::test]
async fn reply_uses_whisper_message() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 31).await;

    let first = alice.repository.encrypt_message(BOB, b"ping").await.unwrap();
    bob.repository.decrypt_message(ALICE, first.kind, &first.ciphertext).await.unwrap();

    let reply = bob.repository.encrypt_message(ALICE, b"pong").await.unwrap();
    assert_eq!(reply.kind, MessageKind::Whisper);
    assert_eq!(reply.kind.as_str(), "msg");

    let plaintext =
        alice.repository.decrypt_message(BOB, reply.kind, &reply.ciphertext).await.unwrap();
    assert_eq!(plaintext, b"pong");
}

#[tokio::test]
async fn encrypt_without_session_is_session_record_error() {
    let alice = make_user(1, ALICE);

    let err = alice.repository.encrypt_message(BOB, b"hi").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SessionRecord);
    assert!(err.to_string().contains("No session record"));
    assert!(alice.store.is_empty().unwrap());
}

#[tokio::test]
async fn inject_session_writes_session_for_address() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);

    connect(&alice, &bob, 5).await;

    let address = alice.repository.address_for(BOB).unwrap();
    assert_eq!(address, "5522222222222.3");
    assert!(alice.store.record(RecordKind::Session, &address).unwrap().is_some());
    assert_eq!(alice.repository.transaction_stats().committed, 1);
}

#[tokio::test]
async fn jid_variants_share_one_session() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, "5522222222222@s.whatsapp.net");
    connect(&alice, &bob, 5).await;

    // Agent suffix and explicit device 0 resolve to the same address.
    let encrypted =
        alice.repository.encrypt_message("5522222222222_1:0@s.whatsapp.net", b"x").await.unwrap();
    assert_eq!(encrypted.kind, MessageKind::PreKey);
}

#[tokio::test]
async fn corrupt_session_is_recovered_transparently() {
    let alice = make_user(1, ALICE);
    let bob = make_user(2, BOB);
    connect(&alice, &bob, 31).await;

    // Bob holds garbage for Alice; the engine reports it as a MAC failure.
    bob.store
        .set(KeyMutations::new().put(RecordKind::Session, "5511111111111.0", vec![0xEE; 5]))
        .await
        .unwrap();

    let encrypted = alice.repository.encrypt_message(BOB, b"after corruption").await.unwrap();
    let plaintext =
        bob.repository.decrypt_message(ALICE, encrypted.kind, &encrypted.ciphertext).await.unwrap();

    assert_eq!(plaintext, b"after corruption");
    assert_eq!(bob.repository.recovery_count(), 1);
    assert_eq!(bob.env.sleeps_ms(), vec![50]);
    assert_eq!(bob.cipher.decrypt_attempts(), 2);

    let session = bob.signal_storage().load_session(&"5511111111111.0".parse().unwrap()).await;
    assert_eq!(session.unwrap().unwrap().as_bytes().len(), 37);
}

#[tokio::test]
async fn invalid_jid_is_rejected_before_any_transaction() {
    let alice = make_user(1, ALICE);

    let err = alice.repository.encrypt_message("not-a-jid", b"x").await.unwrap_err();

    assert!(matches!(err, SessionError::Address(_)));
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(alice.repository.transaction_stats().started, 0);
}
