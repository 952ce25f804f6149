// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared fixtures for the integration tests: storage-backed parties that
//! can complete a handshake, and a job context wired to mock senders.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use smssecure_core::config::SecureSmsConfig;
use smssecure_core::crypto::SymmetricKey;
use smssecure_core::events::{CallbackHandler, EventDispatcher, SmsEvent};
use smssecure_core::jobs::{JobContext, JobEnvironment};
use smssecure_core::protocol::{Address, SessionEngine, SessionProtocol, SharedProtocol};
use smssecure_core::push::{MockPushSender, PushServiceConfig};
use smssecure_core::sms::MockSmsTransport;
use smssecure_core::storage::{SharedStorage, Storage};

pub const ALICE: &str = "+15550001";
pub const BOB: &str = "+15550002";
pub const CAROL: &str = "+15550003";

pub fn test_storage() -> SharedStorage {
    Storage::in_memory(SymmetricKey::generate())
        .unwrap()
        .into_shared()
}

/// One phone: its own database and session engine.
pub struct Party {
    pub number: &'static str,
    pub storage: SharedStorage,
    pub engine: SessionEngine<Storage>,
    pub protocol: SharedProtocol,
}

impl Party {
    pub fn new(number: &'static str) -> Self {
        let storage = test_storage();
        let engine = SessionEngine::new(Arc::clone(&storage));
        let protocol: SharedProtocol = Arc::new(Mutex::new(engine.clone()));
        Party {
            number,
            storage,
            engine,
            protocol,
        }
    }

    pub fn address(&self) -> Address {
        Address::with_default_device(self.number)
    }
}

/// Runs a full key exchange from `initiator` to `responder`.
pub fn handshake(initiator: &mut Party, responder: &mut Party) {
    let initiate = initiator
        .engine
        .initiate_key_exchange(&responder.address())
        .unwrap();
    let response = responder
        .engine
        .process_key_exchange(&initiator.address(), &initiate)
        .unwrap()
        .expect("initiate must be answered");
    let done = initiator
        .engine
        .process_key_exchange(&responder.address(), &response)
        .unwrap();
    assert!(done.is_none());
}

/// Job context over mocks, with every requirement met.
pub struct Harness {
    pub storage: SharedStorage,
    pub push: MockPushSender,
    pub sms: MockSmsTransport,
    pub environment: Arc<JobEnvironment>,
    pub events: Arc<Mutex<Vec<SmsEvent>>>,
    pub context: JobContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(test_storage())
    }

    pub fn with_storage(storage: SharedStorage) -> Self {
        let protocol: SharedProtocol =
            Arc::new(Mutex::new(SessionEngine::new(Arc::clone(&storage))));
        Self::with_protocol(storage, protocol)
    }

    pub fn with_protocol(storage: SharedStorage, protocol: SharedProtocol) -> Self {
        let push = MockPushSender::new();
        let sms = MockSmsTransport::new();
        let environment = Arc::new(JobEnvironment::ready());

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&events);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_handler(Arc::new(CallbackHandler::new(move |event: SmsEvent| {
            recorded.lock().unwrap().push(event);
        })));

        let config = SecureSmsConfig {
            push: push_config(),
            ..SecureSmsConfig::default()
        };
        let context = JobContext::from_config(
            &config,
            Arc::clone(&storage),
            protocol,
            Arc::new(push.clone()),
            Arc::new(sms.clone()),
            Arc::clone(&environment),
        )
        .with_events(Arc::new(dispatcher));

        Harness {
            storage,
            push,
            sms,
            environment,
            events,
            context,
        }
    }

    pub fn events(&self) -> Vec<SmsEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub fn push_config() -> PushServiceConfig {
    PushServiceConfig::new("https://push.example.org", ALICE, "secret")
}
