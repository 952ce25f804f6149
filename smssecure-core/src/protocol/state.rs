//! Persisted session state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::IdentityKey;

/// How many received counters are remembered for duplicate detection.
const MAX_RECEIVED_COUNTERS: usize = 2000;

/// Bootstrap information still attached to outgoing messages until the
/// peer answers on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnacknowledgedPreKey {
    pub prekey_id: u32,
    pub base_key: [u8; 32],
}

/// An established session.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub(crate) remote_identity: IdentityKey,
    pub(crate) base_key: [u8; 32],
    pub(crate) sending_chain: [u8; 32],
    pub(crate) receiving_chain: [u8; 32],
    pub(crate) send_counter: u32,
    pub(crate) receive_floor: u32,
    pub(crate) received: BTreeSet<u32>,
    pub(crate) unacknowledged_prekey: Option<UnacknowledgedPreKey>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("remote_identity", &self.remote_identity)
            .field("send_counter", &self.send_counter)
            .field("received", &self.received.len())
            .finish()
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.sending_chain);
        zeroize::Zeroize::zeroize(&mut self.receiving_chain);
    }
}

impl SessionState {
    pub(crate) fn new(
        remote_identity: IdentityKey,
        base_key: [u8; 32],
        sending_chain: [u8; 32],
        receiving_chain: [u8; 32],
    ) -> Self {
        SessionState {
            remote_identity,
            base_key,
            sending_chain,
            receiving_chain,
            send_counter: 0,
            receive_floor: 0,
            received: BTreeSet::new(),
            unacknowledged_prekey: None,
        }
    }

    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    pub fn send_counter(&self) -> u32 {
        self.send_counter
    }

    pub(crate) fn has_received(&self, counter: u32) -> bool {
        counter < self.receive_floor || self.received.contains(&counter)
    }

    pub(crate) fn mark_received(&mut self, counter: u32) {
        self.received.insert(counter);
        while self.received.len() > MAX_RECEIVED_COUNTERS {
            if let Some(oldest) = self.received.pop_first() {
                self.receive_floor = self.receive_floor.max(oldest + 1);
            }
        }
    }
}

/// A key exchange we initiated and are waiting on.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingKeyExchange {
    pub(crate) sequence: u32,
    pub(crate) base_secret: [u8; 32],
}

impl std::fmt::Debug for PendingKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingKeyExchange")
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Drop for PendingKeyExchange {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.base_secret);
    }
}

/// Everything stored for one address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    pub(crate) current: Option<SessionState>,
    pub(crate) pending: Option<PendingKeyExchange>,
}

impl SessionRecord {
    pub fn has_current_state(&self) -> bool {
        self.current.is_some()
    }

    pub fn has_pending_key_exchange(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_none()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
