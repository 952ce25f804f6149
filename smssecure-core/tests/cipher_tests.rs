// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end tests for the SMS cipher between two storage-backed parties.

mod common;

use common::{handshake, Party, ALICE, BOB, CAROL};
use smssecure_core::cipher::{CipherError, SmsCipher, END_SESSION_SIGNAL};
use smssecure_core::protocol::{SessionEngine, SessionProtocol};
use smssecure_core::sms::{IncomingTextMessage, OutgoingTextMessage, TextKind};
use smssecure_core::storage::{self, Storage};
use smssecure_core::transport::TransportCodec;

fn cipher(party: &Party) -> SmsCipher<SessionEngine<Storage>> {
    SmsCipher::new(party.engine.clone(), TransportCodec::default())
}

/// Encrypts on `from` and delivers the carrier body to `to`'s inbox form.
fn send(from: &Party, to: &Party, body: &str, kind: TextKind) -> IncomingTextMessage {
    let outgoing = OutgoingTextMessage::new(to.number, body, kind);
    let encrypted = cipher(from).encrypt(&outgoing).unwrap();
    IncomingTextMessage::from_wire(from.number, &encrypted.wire_body(), 1_000)
}

fn established() -> (Party, Party) {
    let mut alice = Party::new(ALICE);
    let mut bob = Party::new(BOB);
    handshake(&mut alice, &mut bob);
    (alice, bob)
}

// === Session Messages ===

#[test]
fn test_messages_flow_both_ways_after_key_exchange() {
    let (alice, bob) = established();

    let incoming = send(&alice, &bob, "hello bob", TextKind::SecureText);
    assert_eq!(incoming.kind, TextKind::SecureText);
    assert_ne!(incoming.body, "hello bob");
    let decrypted = cipher(&bob).decrypt(&incoming).unwrap();
    assert_eq!(decrypted.body, "hello bob");
    assert_eq!(decrypted.sender, ALICE);

    let reply = send(&bob, &alice, "hi alice", TextKind::SecureText);
    assert_eq!(cipher(&alice).decrypt(&reply).unwrap().body, "hi alice");
}

#[test]
fn test_out_of_order_delivery_decrypts() {
    let (alice, bob) = established();

    let first = send(&alice, &bob, "one", TextKind::SecureText);
    let second = send(&alice, &bob, "two", TextKind::SecureText);

    assert_eq!(cipher(&bob).decrypt(&second).unwrap().body, "two");
    assert_eq!(cipher(&bob).decrypt(&first).unwrap().body, "one");
}

#[test]
fn test_ciphertext_length_hides_body_length() {
    let (alice, bob) = established();

    let short = send(&alice, &bob, "a", TextKind::SecureText);
    let longer = send(&alice, &bob, "abcdefghij", TextKind::SecureText);
    assert_eq!(short.body.len(), longer.body.len());
}

#[test]
fn test_encrypt_without_session_fails() {
    let alice = Party::new(ALICE);
    let outgoing = OutgoingTextMessage::new(BOB, "hello", TextKind::SecureText);

    let result = cipher(&alice).encrypt(&outgoing);
    assert_eq!(result, Err(CipherError::NoSession(BOB.to_string())));
    assert!(!alice.engine.contains_session(&Party::new(BOB).address()).unwrap());
}

#[test]
fn test_replayed_message_is_duplicate() {
    let (alice, bob) = established();
    let incoming = send(&alice, &bob, "once", TextKind::SecureText);

    cipher(&bob).decrypt(&incoming).unwrap();
    assert_eq!(
        cipher(&bob).decrypt(&incoming),
        Err(CipherError::DuplicateMessage)
    );
}

#[test]
fn test_tampered_body_is_rejected() {
    let (alice, bob) = established();
    let mut incoming = send(&alice, &bob, "intact", TextKind::SecureText);
    let codec = TransportCodec::default();
    let mut bytes = codec.decode(&incoming.body).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    incoming.body = codec.encode(&bytes);

    assert!(matches!(
        cipher(&bob).decrypt(&incoming),
        Err(CipherError::InvalidMessage(_))
    ));
}

#[test]
fn test_garbage_encoding_is_malformed() {
    let (_alice, bob) = established();
    let incoming = IncomingTextMessage::from_wire(ALICE, "?TSM***", 0);

    assert!(matches!(
        cipher(&bob).decrypt(&incoming),
        Err(CipherError::MalformedEncoding(_))
    ));
}

// === Versions ===

#[test]
fn test_older_version_is_legacy() {
    let (_alice, bob) = established();
    let body = TransportCodec::default().encode(&[0x22, 0, 0, 0, 0]);
    let incoming = IncomingTextMessage::from_wire(ALICE, &format!("?TSM{}", body), 0);

    assert_eq!(cipher(&bob).decrypt(&incoming), Err(CipherError::LegacyMessage));
}

#[test]
fn test_newer_version_handling_depends_on_type() {
    let (_alice, bob) = established();
    let body = TransportCodec::default().encode(&[0x44, 0, 0, 0, 0]);

    let secure = IncomingTextMessage::from_wire(ALICE, &format!("?TSM{}", body), 0);
    assert!(matches!(
        cipher(&bob).decrypt(&secure),
        Err(CipherError::InvalidMessage(_))
    ));

    let exchange = IncomingTextMessage::from_wire(ALICE, &format!("?TSK{}", body), 0);
    assert_eq!(
        cipher(&bob).process_key_exchange(&exchange),
        Err(CipherError::InvalidVersion(4))
    );
}

// === End Session ===

#[test]
fn test_terminate_deletes_receiver_session() {
    let (alice, bob) = established();

    let incoming = send(&alice, &bob, END_SESSION_SIGNAL, TextKind::EndSession);
    assert_eq!(incoming.kind, TextKind::EndSession);
    assert!(incoming.end_session);

    let decrypted = cipher(&bob).decrypt(&incoming).unwrap();
    assert_eq!(decrypted.body, END_SESSION_SIGNAL);
    assert!(!bob.engine.contains_session(&alice.address()).unwrap());
}

#[test]
fn test_end_session_with_other_body_keeps_session() {
    let (alice, bob) = established();

    let incoming = send(&alice, &bob, "not the signal", TextKind::EndSession);
    cipher(&bob).decrypt(&incoming).unwrap();
    assert!(bob.engine.contains_session(&alice.address()).unwrap());
}

#[test]
fn test_terminate_on_ordinary_message_keeps_session() {
    let (alice, bob) = established();

    let incoming = send(&alice, &bob, END_SESSION_SIGNAL, TextKind::SecureText);
    cipher(&bob).decrypt(&incoming).unwrap();
    assert!(bob.engine.contains_session(&alice.address()).unwrap());
}

// === Key Exchange ===

#[test]
fn test_key_exchange_over_sms_bodies() {
    let mut alice = Party::new(ALICE);
    let bob = Party::new(BOB);
    let codec = TransportCodec::default();

    let initiate = alice.engine.initiate_key_exchange(&bob.address()).unwrap();
    let incoming =
        IncomingTextMessage::from_wire(ALICE, &format!("?TSK{}", codec.encode(&initiate)), 0);
    assert_eq!(incoming.kind, TextKind::KeyExchange);

    let response = cipher(&bob)
        .process_key_exchange(&incoming)
        .unwrap()
        .expect("initiate is answered");
    assert_eq!(response.kind, TextKind::KeyExchange);
    assert_eq!(response.recipient, ALICE);

    let answered = IncomingTextMessage::from_wire(BOB, &response.wire_body(), 0);
    assert_eq!(cipher(&alice).process_key_exchange(&answered).unwrap(), None);

    assert!(alice.engine.contains_session(&bob.address()).unwrap());
    assert!(!alice.engine.has_pending_key_exchange(&bob.address()).unwrap());
    let message = send(&alice, &bob, "secured", TextKind::SecureText);
    assert_eq!(cipher(&bob).decrypt(&message).unwrap().body, "secured");
}

#[test]
fn test_response_without_initiate_is_stale() {
    let mut alice = Party::new(ALICE);
    let mut bob = Party::new(BOB);
    let mut carol = Party::new(CAROL);

    let initiate = alice.engine.initiate_key_exchange(&bob.address()).unwrap();
    let response = bob
        .engine
        .process_key_exchange(&alice.address(), &initiate)
        .unwrap()
        .unwrap();

    let result = carol.engine.process_key_exchange(&bob.address(), &response);
    assert_eq!(
        result,
        Err(smssecure_core::protocol::ProtocolError::StaleKeyExchange)
    );
}

#[test]
fn test_simultaneous_initiates_settle_on_one_session() {
    let mut alice = Party::new(ALICE);
    let mut bob = Party::new(BOB);

    let from_alice = alice.engine.initiate_key_exchange(&bob.address()).unwrap();
    let from_bob = bob.engine.initiate_key_exchange(&alice.address()).unwrap();

    let at_alice = alice.engine.process_key_exchange(&bob.address(), &from_bob);
    let at_bob = bob.engine.process_key_exchange(&alice.address(), &from_alice);

    // Exactly one side keeps its own handshake.
    let (winner, loser, response) = match (at_alice, at_bob) {
        (Err(_), Ok(Some(response))) => (&mut alice, &bob, response),
        (Ok(Some(response)), Err(_)) => (&mut bob, &alice, response),
        other => panic!("unexpected outcome: {:?}", other),
    };
    let loser_address = loser.address();
    assert_eq!(
        winner
            .engine
            .process_key_exchange(&loser_address, &response)
            .unwrap(),
        None
    );

    let message = send(winner, loser, "settled", TextKind::SecureText);
    assert_eq!(cipher(loser).decrypt(&message).unwrap().body, "settled");
}

// === Identity Trust ===

#[test]
fn test_changed_identity_is_untrusted_until_accepted() {
    let (alice, _bob) = established();
    let mut new_bob = Party::new(BOB);
    let new_key = new_bob.engine.identity_key().unwrap();
    let codec = TransportCodec::default();

    let initiate = new_bob
        .engine
        .initiate_key_exchange(&alice.address())
        .unwrap();
    let incoming =
        IncomingTextMessage::from_wire(BOB, &format!("?TSK{}", codec.encode(&initiate)), 0);

    let result = cipher(&alice).process_key_exchange(&incoming);
    assert_eq!(
        result,
        Err(CipherError::UntrustedIdentity {
            name: BOB.to_string(),
            identity_key: new_key,
        })
    );

    storage::lock(&alice.storage)
        .unwrap()
        .accept_identity(BOB, &new_key)
        .unwrap();
    assert!(!alice.engine.contains_session(&new_bob.address()).unwrap());
    assert!(cipher(&alice)
        .process_key_exchange(&incoming)
        .unwrap()
        .is_some());
}

// === Pre-Key Bundles ===

#[test]
fn test_prekey_bundle_bootstraps_until_first_reply() {
    let alice = Party::new(ALICE);
    let bob = Party::new(BOB);

    let bundle = bob.engine.generate_prekey_bundle(7).unwrap();
    alice
        .engine
        .process_prekey_bundle(&bob.address(), &bundle)
        .unwrap();

    let first = send(&alice, &bob, "first", TextKind::SecureText);
    assert_eq!(first.kind, TextKind::PreKeyBundle);
    let second = send(&alice, &bob, "second", TextKind::SecureText);
    assert_eq!(second.kind, TextKind::PreKeyBundle);

    assert_eq!(cipher(&bob).decrypt_prekey_bundle(&first).unwrap().body, "first");
    assert_eq!(cipher(&bob).decrypt_prekey_bundle(&second).unwrap().body, "second");
    assert!(bob.engine.contains_session(&alice.address()).unwrap());

    let reply = send(&bob, &alice, "got it", TextKind::SecureText);
    assert_eq!(reply.kind, TextKind::SecureText);
    assert_eq!(cipher(&alice).decrypt(&reply).unwrap().body, "got it");

    let third = send(&alice, &bob, "third", TextKind::SecureText);
    assert_eq!(third.kind, TextKind::SecureText);
    assert_eq!(cipher(&bob).decrypt(&third).unwrap().body, "third");
}

#[test]
fn test_unknown_prekey_id_is_invalid() {
    let alice = Party::new(ALICE);
    let bob = Party::new(BOB);
    let other = Party::new(BOB);

    // A bundle Bob never generated.
    let mut forged = other.engine.generate_prekey_bundle(99).unwrap();
    forged.identity_key = bob.engine.identity_key().unwrap();
    alice
        .engine
        .process_prekey_bundle(&bob.address(), &forged)
        .unwrap();

    let first = send(&alice, &bob, "lost", TextKind::SecureText);
    assert!(matches!(
        cipher(&bob).decrypt_prekey_bundle(&first),
        Err(CipherError::InvalidMessage(_))
    ));
}
