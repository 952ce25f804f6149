// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for handshake initiation and incoming SMS routing.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{Party, ALICE, BOB};
use smssecure_core::cipher::{
    CipherError, ConfirmationPrompt, InitiateOutcome, KeyExchangeInitiator, SmsCipher, SmsDispatcher,
    END_SESSION_SIGNAL,
};
use smssecure_core::error::SmsSecureError;
use smssecure_core::events::{CallbackHandler, EventDispatcher, SmsEvent};
use smssecure_core::protocol::SessionProtocol;
use smssecure_core::receiver::{MessageReceiver, Received};
use smssecure_core::recipients::RecipientError;
use smssecure_core::sms::{IncomingTextMessage, OutgoingTextMessage, TextKind};
use smssecure_core::transport::TransportCodec;

#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<OutgoingTextMessage>>,
}

impl RecordingDispatcher {
    fn sent(&self) -> Vec<OutgoingTextMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn take_last(&self) -> OutgoingTextMessage {
        self.sent.lock().unwrap().pop().expect("a message was dispatched")
    }
}

impl SmsDispatcher for RecordingDispatcher {
    fn dispatch(&self, message: OutgoingTextMessage) -> Result<(), SmsSecureError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

struct ScriptedPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl ScriptedPrompt {
    fn answering(answer: bool) -> Arc<Self> {
        Arc::new(ScriptedPrompt {
            answer,
            asked: AtomicUsize::new(0),
        })
    }

    fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl ConfirmationPrompt for ScriptedPrompt {
    fn confirm_key_exchange(&self, _recipient: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

fn initiator(
    party: &Party,
    dispatcher: &Arc<RecordingDispatcher>,
    prompt: &Arc<ScriptedPrompt>,
) -> KeyExchangeInitiator {
    KeyExchangeInitiator::new(
        Arc::clone(&party.protocol),
        TransportCodec::default(),
        Arc::clone(dispatcher) as Arc<dyn SmsDispatcher>,
        Arc::clone(prompt) as Arc<dyn ConfirmationPrompt>,
    )
}

fn receiver(
    party: &Party,
    dispatcher: &Arc<RecordingDispatcher>,
    events: Arc<EventDispatcher>,
) -> MessageReceiver {
    MessageReceiver::new(
        Arc::clone(&party.protocol),
        TransportCodec::default(),
        Arc::clone(dispatcher) as Arc<dyn SmsDispatcher>,
        events,
    )
}

fn deliver(from: &str, message: &OutgoingTextMessage) -> IncomingTextMessage {
    IncomingTextMessage::from_wire(from, &message.wire_body(), 5_000)
}

// === Initiator ===

#[test]
fn test_initiate_dispatches_key_exchange() {
    let alice = Party::new(ALICE);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let prompt = ScriptedPrompt::answering(true);

    let outcome = initiator(&alice, &dispatcher, &prompt)
        .initiate("+1 (555) 000-2", true)
        .unwrap();
    assert_eq!(outcome, InitiateOutcome::Sent);

    let sent = dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, BOB);
    assert_eq!(sent[0].kind, TextKind::KeyExchange);
    assert!(sent[0].wire_body().starts_with("?TSK"));
    assert_eq!(prompt.asked(), 0);
    assert!(alice
        .engine
        .has_pending_key_exchange(&Party::new(BOB).address())
        .unwrap());
}

#[test]
fn test_pending_exchange_declined_sends_nothing() {
    let alice = Party::new(ALICE);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let prompt = ScriptedPrompt::answering(false);
    let initiator = initiator(&alice, &dispatcher, &prompt);

    initiator.initiate(BOB, true).unwrap();
    let first = dispatcher.sent();

    let outcome = initiator.initiate(BOB, true).unwrap();
    assert_eq!(outcome, InitiateOutcome::Declined);
    assert_eq!(prompt.asked(), 1);
    assert_eq!(dispatcher.sent(), first);
}

#[test]
fn test_pending_exchange_confirmed_sends_again() {
    let alice = Party::new(ALICE);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let prompt = ScriptedPrompt::answering(true);
    let initiator = initiator(&alice, &dispatcher, &prompt);

    initiator.initiate(BOB, true).unwrap();
    assert_eq!(initiator.initiate(BOB, true).unwrap(), InitiateOutcome::Sent);
    assert_eq!(prompt.asked(), 1);
    assert_eq!(dispatcher.sent().len(), 2);
}

#[test]
fn test_without_confirmation_prompt_is_skipped() {
    let alice = Party::new(ALICE);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let prompt = ScriptedPrompt::answering(false);
    let initiator = initiator(&alice, &dispatcher, &prompt);

    initiator.initiate(BOB, false).unwrap();
    assert_eq!(initiator.initiate(BOB, false).unwrap(), InitiateOutcome::Sent);
    assert_eq!(prompt.asked(), 0);
}

#[test]
fn test_invalid_recipient_is_rejected() {
    let alice = Party::new(ALICE);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let prompt = ScriptedPrompt::answering(true);

    let result = initiator(&alice, &dispatcher, &prompt).initiate("not a number", true);
    assert!(matches!(
        result,
        Err(SmsSecureError::Recipient(RecipientError::Formatting(_)))
            | Err(SmsSecureError::Recipient(RecipientError::InvalidNumber(_)))
    ));
    assert!(dispatcher.sent().is_empty());
}

// === Receiver ===

#[test]
fn test_receiver_completes_handshake_and_decrypts() {
    let alice = Party::new(ALICE);
    let bob = Party::new(BOB);
    let alice_out = Arc::new(RecordingDispatcher::default());
    let bob_out = Arc::new(RecordingDispatcher::default());
    let prompt = ScriptedPrompt::answering(true);
    let events = Arc::new(EventDispatcher::new());

    initiator(&alice, &alice_out, &prompt)
        .initiate(BOB, true)
        .unwrap();
    let initiate = alice_out.take_last();

    let at_bob = receiver(&bob, &bob_out, Arc::clone(&events))
        .receive(deliver(ALICE, &initiate))
        .unwrap();
    assert_eq!(at_bob, Received::KeyExchange { responded: true });
    let response = bob_out.take_last();
    assert_eq!(response.recipient, ALICE);

    let at_alice = receiver(&alice, &alice_out, Arc::clone(&events))
        .receive(deliver(BOB, &response))
        .unwrap();
    assert_eq!(at_alice, Received::KeyExchange { responded: false });
    assert!(alice_out.sent().is_empty());

    let secret = {
        let mut protocol = alice.protocol.lock().unwrap();
        SmsCipher::new(&mut *protocol, TransportCodec::default())
            .encrypt(&OutgoingTextMessage::new(BOB, "over sms", TextKind::SecureText))
            .unwrap()
    };
    match receiver(&bob, &bob_out, events).receive(deliver(ALICE, &secret)).unwrap() {
        Received::Text(text) => assert_eq!(text.body, "over sms"),
        other => panic!("expected text, got {:?}", other),
    }
}

#[test]
fn test_receiver_passes_plain_text_through() {
    let bob = Party::new(BOB);
    let out = Arc::new(RecordingDispatcher::default());
    let incoming = IncomingTextMessage::from_wire(ALICE, "just text", 1);

    let received = receiver(&bob, &out, Arc::new(EventDispatcher::new()))
        .receive(incoming.clone())
        .unwrap();
    assert_eq!(received, Received::Text(incoming));
}

#[test]
fn test_receiver_reports_terminated_session() {
    let mut alice = Party::new(ALICE);
    let mut bob = Party::new(BOB);
    common::handshake(&mut alice, &mut bob);

    let terminated = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&terminated);
    let mut events = EventDispatcher::new();
    events.add_handler(Arc::new(CallbackHandler::new(move |event: SmsEvent| {
        recorded.lock().unwrap().push(event);
    })));

    let end = SmsCipher::new(alice.engine.clone(), TransportCodec::default())
        .encrypt(&OutgoingTextMessage::new(
            BOB,
            END_SESSION_SIGNAL,
            TextKind::EndSession,
        ))
        .unwrap();

    let out = Arc::new(RecordingDispatcher::default());
    receiver(&bob, &out, Arc::new(events))
        .receive(deliver(ALICE, &end))
        .unwrap();

    assert_eq!(
        *terminated.lock().unwrap(),
        vec![SmsEvent::SessionTerminated {
            sender: ALICE.to_string()
        }]
    );
    assert!(!bob.engine.contains_session(&alice.address()).unwrap());
}

#[test]
fn test_receiver_without_session_fails() {
    let bob = Party::new(BOB);
    let mut other_bob = Party::new(BOB);
    let mut other_alice = Party::new(ALICE);
    common::handshake(&mut other_alice, &mut other_bob);

    let secret = SmsCipher::new(other_alice.engine.clone(), TransportCodec::default())
        .encrypt(&OutgoingTextMessage::new(BOB, "lost", TextKind::SecureText))
        .unwrap();
    let out = Arc::new(RecordingDispatcher::default());

    let result = receiver(&bob, &out, Arc::new(EventDispatcher::new()))
        .receive(deliver(ALICE, &secret));
    assert!(matches!(
        result,
        Err(SmsSecureError::Cipher(CipherError::NoSession(_)))
    ));
}
