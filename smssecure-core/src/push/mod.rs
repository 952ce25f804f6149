// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Push Service Boundary
//!
//! Envelopes sent over the push service, the structured per-recipient
//! result of a send, and the sender the delivery jobs call.

mod config;
mod group;
mod message;
mod mock;

pub use config::{PushCredentials, PushServiceConfig, TrustStore};
pub use group::{decode_group_id, encode_group_id, is_group_id, GROUP_ID_PREFIX};
pub use message::{Attachment, GroupContext, GroupType, PushMessage};
pub use mock::{MockOutcome, MockPushSender};

use thiserror::Error;

use crate::protocol::{Address, IdentityKey};

/// Errors raised by the push sender as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Network I/O failed; the send may succeed later.
    #[error("Push network error: {0}")]
    Network(String),

    /// The service refused our credentials.
    #[error("Push authorization failed: {0}")]
    Unauthorized(String),

    /// The service rejected the message.
    #[error("Push rejected: {0}")]
    Rejected(String),

    #[error("Malformed group context: {0}")]
    MalformedGroupContext(String),

    #[error("Invalid push configuration: {0}")]
    InvalidConfig(String),
}

impl PushError {
    /// Returns true if sending again later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PushError::Network(_))
    }
}

/// Per-recipient outcome of one push send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendResult {
    pub sent: Vec<Address>,
    pub network_failures: Vec<Address>,
    pub untrusted_identities: Vec<(Address, IdentityKey)>,
    pub unregistered: Vec<Address>,
}

impl SendResult {
    /// Result where every address was delivered.
    pub fn all_sent(addresses: &[Address]) -> Self {
        SendResult {
            sent: addresses.to_vec(),
            ..Default::default()
        }
    }

    /// Returns true if any recipient failed.
    pub fn has_failures(&self) -> bool {
        !self.network_failures.is_empty()
            || !self.untrusted_identities.is_empty()
            || !self.unregistered.is_empty()
    }
}

/// Sends envelopes to push recipients.
pub trait PushSender: Send {
    /// Sends `message` to every address. Per-recipient failures are reported
    /// in the result; `Err` means nothing can be said about delivery.
    fn send_message(
        &mut self,
        addresses: &[Address],
        message: &PushMessage,
    ) -> Result<SendResult, PushError>;
}

/// Builds a push sender from explicit configuration.
pub trait PushSenderFactory: Send + Sync {
    fn create(&self, config: &PushServiceConfig) -> Result<Box<dyn PushSender>, PushError>;
}
