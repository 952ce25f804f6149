// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for single SMS delivery through the job system.

mod common;

use std::sync::Arc;

use common::{handshake, Harness, Party, ALICE, BOB, CAROL};
use smssecure_core::cipher::{
    ConfirmationPrompt, KeyExchangeInitiator, SmsCipher, SmsDispatcher,
};
use smssecure_core::config::JobConfig;
use smssecure_core::events::SmsEvent;
use smssecure_core::jobs::JobManager;
use smssecure_core::sender::MessageSender;
use smssecure_core::sms::{IncomingTextMessage, OutgoingTextMessage, SmsError, TextKind};
use smssecure_core::storage::{self, MessageId, MessageStatus};
use smssecure_core::transport::TransportCodec;

struct AlwaysConfirm;

impl ConfirmationPrompt for AlwaysConfirm {
    fn confirm_key_exchange(&self, _recipient: &str) -> bool {
        true
    }
}

/// Alice's phone: her own engine wired into the job context.
struct Phone {
    party: Party,
    harness: Harness,
    manager: JobManager,
    sender: MessageSender,
}

impl Phone {
    fn new(party: Party) -> Self {
        let harness =
            Harness::with_protocol(Arc::clone(&party.storage), Arc::clone(&party.protocol));
        let manager = JobManager::new(harness.context.clone(), JobConfig::default());
        let sender = MessageSender::new(manager.clone());
        Phone {
            party,
            harness,
            manager,
            sender,
        }
    }

    fn send(&self, recipient: &str, body: &str, kind: TextKind) -> MessageId {
        self.sender
            .send_text(OutgoingTextMessage::new(recipient, body, kind))
            .unwrap()
    }

    fn record(&self, id: MessageId) -> storage::MessageRecord {
        storage::lock(&self.harness.storage)
            .unwrap()
            .get_message_record(id)
            .unwrap()
    }
}

#[test]
fn test_plain_text_is_sent_as_is() {
    let phone = Phone::new(Party::new(ALICE));
    let id = phone.send("+1 555 000-2", "hello", TextKind::Text);

    assert_eq!(phone.manager.run_until_idle().unwrap(), 1);

    let sent = phone.harness.sms.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, BOB);
    assert_eq!(sent[0].wire_body(), "hello");

    let record = phone.record(id);
    assert_eq!(record.status, MessageStatus::Sent);
    assert!(!record.secure);
    assert_eq!(
        phone.harness.events(),
        vec![SmsEvent::MessageSent { message_id: id }]
    );
}

#[test]
fn test_invalid_recipient_is_rejected_before_storing() {
    let phone = Phone::new(Party::new(ALICE));
    let result = phone
        .sender
        .send_text(OutgoingTextMessage::new("call me", "hi", TextKind::Text));

    assert!(result.is_err());
    assert_eq!(phone.manager.pending_count(), 0);
}

#[test]
fn test_secure_text_without_session_never_reaches_carrier() {
    let phone = Phone::new(Party::new(ALICE));
    let id = phone.send(BOB, "secret", TextKind::SecureText);

    assert_eq!(phone.manager.run_until_idle().unwrap(), 1);

    assert_eq!(phone.harness.sms.sent_count(), 0);
    assert_eq!(phone.record(id).status, MessageStatus::SentFailed);
    assert_eq!(
        phone.harness.events(),
        vec![SmsEvent::DeliveryFailed {
            message_id: id,
            destination: BOB.to_string(),
        }]
    );
}

#[test]
fn test_secure_text_is_encrypted_for_recipient() {
    let mut alice = Party::new(ALICE);
    let mut bob = Party::new(BOB);
    handshake(&mut alice, &mut bob);
    let phone = Phone::new(alice);

    let id = phone.send(BOB, "meet at noon", TextKind::SecureText);
    phone.manager.run_until_idle().unwrap();

    let sent = phone.harness.sms.sent();
    assert_eq!(sent[0].kind, TextKind::SecureText);
    assert!(sent[0].wire_body().starts_with("?TSM"));
    assert!(!sent[0].body.contains("noon"));

    let incoming = IncomingTextMessage::from_wire(ALICE, &sent[0].wire_body(), 0);
    let decrypted = SmsCipher::new(bob.engine.clone(), TransportCodec::default())
        .decrypt(&incoming)
        .unwrap();
    assert_eq!(decrypted.body, "meet at noon");

    let record = phone.record(id);
    assert_eq!(record.status, MessageStatus::Sent);
    assert!(record.secure);
}

#[test]
fn test_messages_to_one_recipient_keep_order() {
    let phone = Phone::new(Party::new(ALICE));
    phone.send(BOB, "first", TextKind::Text);
    phone.send(CAROL, "other", TextKind::Text);
    phone.send(BOB, "second", TextKind::Text);

    phone.manager.run_until_idle().unwrap();

    let to_bob: Vec<_> = phone
        .harness
        .sms
        .sent()
        .into_iter()
        .filter(|m| m.recipient == BOB)
        .map(|m| m.body)
        .collect();
    assert_eq!(to_bob, vec!["first", "second"]);
}

#[test]
fn test_carrier_outage_is_retried() {
    let phone = Phone::new(Party::new(ALICE));
    phone
        .harness
        .sms
        .fail_next(SmsError::Unavailable("no signal".into()));
    let id = phone.send(BOB, "retry me", TextKind::Text);

    assert_eq!(phone.manager.run_until_idle().unwrap(), 2);
    assert_eq!(phone.harness.sms.sent_count(), 1);
    assert_eq!(phone.record(id).status, MessageStatus::Sent);
}

#[test]
fn test_carrier_rejection_fails_message() {
    let phone = Phone::new(Party::new(ALICE));
    phone
        .harness
        .sms
        .fail_next(SmsError::Rejected("blocked".into()));
    let id = phone.send(BOB, "nope", TextKind::Text);

    assert_eq!(phone.manager.run_until_idle().unwrap(), 1);
    assert_eq!(phone.record(id).status, MessageStatus::SentFailed);
}

#[test]
fn test_sms_runs_with_service_but_no_data_network() {
    let phone = Phone::new(Party::new(ALICE));
    phone.harness.environment.set_network_available(false);
    phone.send(BOB, "radio only", TextKind::Text);

    assert_eq!(phone.manager.run_until_idle().unwrap(), 1);

    phone.harness.environment.set_service_available(false);
    phone.send(BOB, "offline", TextKind::Text);
    assert_eq!(phone.manager.run_until_idle().unwrap(), 0);
    assert_eq!(phone.manager.pending_count(), 1);
}

#[test]
fn test_initiator_hands_handshake_to_sender() {
    let phone = Phone::new(Party::new(ALICE));
    let initiator = KeyExchangeInitiator::new(
        Arc::clone(&phone.party.protocol),
        TransportCodec::default(),
        Arc::new(phone.sender.clone()) as Arc<dyn SmsDispatcher>,
        Arc::new(AlwaysConfirm),
    );

    initiator.initiate(BOB, true).unwrap();
    assert_eq!(phone.manager.pending_count(), 1);
    phone.manager.run_until_idle().unwrap();

    let sent = phone.harness.sms.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, TextKind::KeyExchange);
    assert!(sent[0].wire_body().starts_with("?TSK"));
    assert!(phone
        .harness
        .events()
        .contains(&SmsEvent::KeyExchangeSent {
            recipient: BOB.to_string()
        }));
}
