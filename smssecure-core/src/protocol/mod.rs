// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Protocol Boundary
//!
//! The contract this crate consumes from a session-based (Axolotl style)
//! encryption library: per-address session presence, encrypt/decrypt, and
//! the key exchange that establishes a session.
//!
//! [`SessionEngine`] is the implementation shipped with the crate. It runs
//! over any [`ProtocolStore`] (normally [`crate::storage::Storage`]) and
//! derives one key per message from a per-direction chain secret. Callers
//! depend on [`SessionProtocol`] only, so a different library can be
//! plugged in.

mod address;
mod engine;
mod keys;
mod message;
mod state;
mod store;

use std::sync::{Arc, Mutex};

use thiserror::Error;

pub use address::{Address, DEFAULT_DEVICE_ID};
pub use engine::SessionEngine;
pub use keys::{IdentityKey, IdentityKeyPair, PreKeyBundle, PreKeyRecord};
pub use message::{
    KeyExchangeMessage, PreKeyWhisperMessage, WhisperMessage, CURRENT_VERSION,
    KEY_EXCHANGE_INITIATE, KEY_EXCHANGE_RESPONSE,
};
pub use state::{PendingKeyExchange, SessionRecord, SessionState};
pub use store::{IdentityKeyStore, PreKeyStore, ProtocolStore, SessionStore};

/// A protocol shared between jobs and the receive path. Holding the lock
/// for a whole cipher call gives that call exclusive access to the session.
pub type SharedProtocol = Arc<Mutex<dyn SessionProtocol + Send>>;

/// Errors raised by the session protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("No session for: {0}")]
    NoSession(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Legacy message version")]
    LegacyMessage,

    #[error("Unsupported message version: {0}")]
    InvalidVersion(u8),

    #[error("Duplicate message (already decrypted)")]
    DuplicateMessage,

    #[error("Untrusted identity key for {name}")]
    UntrustedIdentity {
        name: String,
        identity_key: IdentityKey,
    },

    #[error("Stale key exchange")]
    StaleKeyExchange,

    #[error("No pre-key with id {0}")]
    InvalidKeyId(u32),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<crate::storage::StorageError> for ProtocolError {
    fn from(err: crate::storage::StorageError) -> Self {
        ProtocolError::Store(err.to_string())
    }
}

/// Kind of ciphertext reported by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiphertextKind {
    /// Ordinary message on an established session.
    Whisper,
    /// Message that also carries the key material to bootstrap the session.
    PreKey,
}

/// Serialized ciphertext plus its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextMessage {
    pub kind: CiphertextKind,
    pub body: Vec<u8>,
}

/// The session cipher and builder contract.
///
/// Implementations assume exclusive access to an address's session for the
/// duration of each call; callers serialize calls per address.
pub trait SessionProtocol {
    /// Returns true if an established session exists for `address`.
    fn contains_session(&self, address: &Address) -> Result<bool, ProtocolError>;

    /// Returns true if we sent a key exchange to `address` that has not been
    /// answered yet.
    fn has_pending_key_exchange(&self, address: &Address) -> Result<bool, ProtocolError>;

    /// Deletes the session for `address`.
    fn delete_session(&mut self, address: &Address) -> Result<(), ProtocolError>;

    /// Encrypts a (padded) plaintext on the session for `address`.
    fn encrypt(
        &mut self,
        address: &Address,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, ProtocolError>;

    /// Decrypts an ordinary session message.
    fn decrypt_message(&mut self, address: &Address, message: &[u8])
        -> Result<Vec<u8>, ProtocolError>;

    /// Decrypts a pre-key message, creating the session if needed.
    fn decrypt_prekey_message(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Starts a key exchange and returns the serialized handshake message.
    fn initiate_key_exchange(&mut self, address: &Address) -> Result<Vec<u8>, ProtocolError>;

    /// Processes a received handshake message, returning a response if one
    /// must be sent back.
    fn process_key_exchange(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>, ProtocolError>;
}

impl<T: SessionProtocol + ?Sized> SessionProtocol for &mut T {
    fn contains_session(&self, address: &Address) -> Result<bool, ProtocolError> {
        (**self).contains_session(address)
    }

    fn has_pending_key_exchange(&self, address: &Address) -> Result<bool, ProtocolError> {
        (**self).has_pending_key_exchange(address)
    }

    fn delete_session(&mut self, address: &Address) -> Result<(), ProtocolError> {
        (**self).delete_session(address)
    }

    fn encrypt(
        &mut self,
        address: &Address,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, ProtocolError> {
        (**self).encrypt(address, plaintext)
    }

    fn decrypt_message(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        (**self).decrypt_message(address, message)
    }

    fn decrypt_prekey_message(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        (**self).decrypt_prekey_message(address, message)
    }

    fn initiate_key_exchange(&mut self, address: &Address) -> Result<Vec<u8>, ProtocolError> {
        (**self).initiate_key_exchange(address)
    }

    fn process_key_exchange(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>, ProtocolError> {
        (**self).process_key_exchange(address, message)
    }
}
