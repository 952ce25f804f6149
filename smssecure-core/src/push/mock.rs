//! Scriptable push sender for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{PushError, PushMessage, PushSender, PushSenderFactory, PushServiceConfig, SendResult};
use crate::protocol::{Address, IdentityKey};

/// How the mock answers for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    NetworkFailure,
    UntrustedIdentity(IdentityKey),
    Unregistered,
}

#[derive(Default)]
struct MockState {
    outcomes: HashMap<String, MockOutcome>,
    errors: Vec<PushError>,
    sends: Vec<(Vec<Address>, PushMessage)>,
    created: usize,
}

/// Push sender whose answers are scripted per recipient number.
///
/// Clones share state, so a test keeps one handle while the job manager
/// builds senders from another.
#[derive(Clone, Default)]
pub struct MockPushSender {
    state: Arc<Mutex<MockState>>,
}

impl MockPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome for a recipient until cleared.
    pub fn set_outcome(&self, number: &str, outcome: MockOutcome) {
        if let Ok(mut state) = self.state.lock() {
            state.outcomes.insert(number.to_string(), outcome);
        }
    }

    /// Lets a recipient succeed again.
    pub fn clear_outcome(&self, number: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.outcomes.remove(number);
        }
    }

    /// Queues an error for the next send call.
    pub fn fail_next(&self, error: PushError) {
        if let Ok(mut state) = self.state.lock() {
            state.errors.push(error);
        }
    }

    /// Returns every `(addresses, message)` pair sent so far.
    pub fn sends(&self) -> Vec<(Vec<Address>, PushMessage)> {
        self.state
            .lock()
            .map(|state| state.sends.clone())
            .unwrap_or_default()
    }

    pub fn send_count(&self) -> usize {
        self.state.lock().map(|state| state.sends.len()).unwrap_or(0)
    }

    /// Number of senders built through the factory.
    pub fn created_count(&self) -> usize {
        self.state.lock().map(|state| state.created).unwrap_or(0)
    }
}

impl PushSender for MockPushSender {
    fn send_message(
        &mut self,
        addresses: &[Address],
        message: &PushMessage,
    ) -> Result<SendResult, PushError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PushError::Network("mock state poisoned".to_string()))?;

        if !state.errors.is_empty() {
            return Err(state.errors.remove(0));
        }

        state.sends.push((addresses.to_vec(), message.clone()));

        let mut result = SendResult::default();
        for address in addresses {
            match state.outcomes.get(address.name()) {
                None => result.sent.push(address.clone()),
                Some(MockOutcome::NetworkFailure) => result.network_failures.push(address.clone()),
                Some(MockOutcome::UntrustedIdentity(key)) => {
                    result.untrusted_identities.push((address.clone(), *key))
                }
                Some(MockOutcome::Unregistered) => result.unregistered.push(address.clone()),
            }
        }
        Ok(result)
    }
}

impl PushSenderFactory for MockPushSender {
    fn create(&self, config: &PushServiceConfig) -> Result<Box<dyn PushSender>, PushError> {
        config.validate()?;
        if let Ok(mut state) = self.state.lock() {
            state.created += 1;
        }
        Ok(Box::new(self.clone()))
    }
}
