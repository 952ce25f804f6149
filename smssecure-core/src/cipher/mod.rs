// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SMS Cipher
//!
//! Drives the session protocol for SMS bodies: pad, encrypt and encode on
//! the way out; decode, decrypt and strip padding on the way in. Handshake
//! messages are handed to the session builder and any response is
//! addressed back to the sender.
//!
//! # Example
//!
//! ```ignore
//! let mut guard = protocol.lock()?;
//! let mut cipher = SmsCipher::new(&mut *guard, TransportCodec::default());
//! let outgoing = cipher.encrypt(&message)?;
//! ```

pub mod initiator;

pub use initiator::{ConfirmationPrompt, InitiateOutcome, KeyExchangeInitiator, SmsDispatcher};

use thiserror::Error;
use tracing::{debug, info};

use crate::protocol::{Address, CiphertextKind, IdentityKey, ProtocolError, SessionProtocol};
use crate::sms::{IncomingTextMessage, OutgoingTextMessage, TextKind};
use crate::transport::{TransportCodec, TransportError};

/// Plaintext that, sent on an end-session message, tears the session down.
pub const END_SESSION_SIGNAL: &str = "TERMINATE";

/// Cipher error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("No session for: {0}")]
    NoSession(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Legacy message version")]
    LegacyMessage,

    #[error("Unsupported message version: {0}")]
    InvalidVersion(u8),

    #[error("Duplicate message")]
    DuplicateMessage,

    #[error("Untrusted identity key for {name}")]
    UntrustedIdentity {
        name: String,
        identity_key: IdentityKey,
    },

    #[error("Stale key exchange")]
    StaleKeyExchange,

    #[error("Malformed padding: {0}")]
    MalformedPadding(String),

    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Failed to encode message: {0}")]
    Encoding(String),
}

impl From<ProtocolError> for CipherError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::NoSession(name) => CipherError::NoSession(name),
            ProtocolError::InvalidMessage(reason) => CipherError::InvalidMessage(reason),
            ProtocolError::LegacyMessage => CipherError::LegacyMessage,
            ProtocolError::InvalidVersion(version) => CipherError::InvalidVersion(version),
            ProtocolError::DuplicateMessage => CipherError::DuplicateMessage,
            ProtocolError::UntrustedIdentity { name, identity_key } => {
                CipherError::UntrustedIdentity { name, identity_key }
            }
            ProtocolError::StaleKeyExchange => CipherError::StaleKeyExchange,
            // Bad key references are indistinguishable from a corrupt message
            // to the caller.
            ProtocolError::InvalidKeyId(id) => {
                CipherError::InvalidMessage(format!("unknown pre-key id {}", id))
            }
            ProtocolError::InvalidKey(reason) => CipherError::InvalidMessage(reason),
            ProtocolError::Store(reason) => CipherError::Store(reason),
            ProtocolError::Serialization(reason) => CipherError::Encoding(reason),
        }
    }
}

impl From<TransportError> for CipherError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::MalformedPadding(reason) => CipherError::MalformedPadding(reason),
            TransportError::MalformedEncoding(reason) => CipherError::MalformedEncoding(reason),
        }
    }
}

/// Session-aware cipher for SMS bodies.
pub struct SmsCipher<P: SessionProtocol> {
    protocol: P,
    codec: TransportCodec,
}

impl<P: SessionProtocol> SmsCipher<P> {
    pub fn new(protocol: P, codec: TransportCodec) -> Self {
        SmsCipher { protocol, codec }
    }

    /// Returns the underlying protocol.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Encrypts an outgoing message for its recipient.
    ///
    /// Fails with `NoSession` before touching the protocol state when no
    /// session exists. The result is a pre-key bundle message while the
    /// session is still being bootstrapped.
    pub fn encrypt(
        &mut self,
        message: &OutgoingTextMessage,
    ) -> Result<OutgoingTextMessage, CipherError> {
        let address = Address::with_default_device(message.recipient.as_str());
        if !self.protocol.contains_session(&address)? {
            return Err(CipherError::NoSession(message.recipient.clone()));
        }

        let padded = self.codec.pad(message.body.as_bytes());
        let ciphertext = self.protocol.encrypt(&address, &padded)?;
        let body = self.codec.encode(&ciphertext.body);

        let kind = match (ciphertext.kind, message.kind) {
            (CiphertextKind::PreKey, _) => TextKind::PreKeyBundle,
            (CiphertextKind::Whisper, TextKind::EndSession) => TextKind::EndSession,
            (CiphertextKind::Whisper, _) => TextKind::SecureText,
        };
        Ok(message.with_body(body, kind))
    }

    /// Decrypts an ordinary session message.
    pub fn decrypt(
        &mut self,
        message: &IncomingTextMessage,
    ) -> Result<IncomingTextMessage, CipherError> {
        let address = Address::with_default_device(message.sender.as_str());
        let ciphertext = self.codec.decode(&message.body)?;
        let padded = self.protocol.decrypt_message(&address, &ciphertext)?;
        let plaintext = self.finish_decrypt(&address, message, &padded)?;
        Ok(message.with_body(plaintext))
    }

    /// Decrypts a message that also bootstraps the session.
    pub fn decrypt_prekey_bundle(
        &mut self,
        message: &IncomingTextMessage,
    ) -> Result<IncomingTextMessage, CipherError> {
        let address = Address::with_default_device(message.sender.as_str());
        let ciphertext = self.codec.decode(&message.body)?;
        let padded = self.protocol.decrypt_prekey_message(&address, &ciphertext)?;
        let plaintext = self.finish_decrypt(&address, message, &padded)?;
        Ok(message.with_body(plaintext))
    }

    /// Feeds a received handshake message to the session builder.
    ///
    /// Returns the response to send back, if any.
    pub fn process_key_exchange(
        &mut self,
        message: &IncomingTextMessage,
    ) -> Result<Option<OutgoingTextMessage>, CipherError> {
        let address = Address::with_default_device(message.sender.as_str());
        let bytes = self.codec.decode(&message.body)?;
        let response = self.protocol.process_key_exchange(&address, &bytes)?;

        Ok(response.map(|response| {
            debug!(sender = %address, "answering key exchange");
            OutgoingTextMessage::new(
                message.sender.as_str(),
                self.codec.encode(&response),
                TextKind::KeyExchange,
            )
        }))
    }

    fn finish_decrypt(
        &mut self,
        address: &Address,
        message: &IncomingTextMessage,
        padded: &[u8],
    ) -> Result<String, CipherError> {
        let plaintext = self.codec.strip_padding(padded)?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|e| CipherError::InvalidMessage(e.to_string()))?;

        if message.end_session && plaintext == END_SESSION_SIGNAL {
            self.protocol.delete_session(address)?;
            info!(sender = %address, "session terminated by peer");
        }
        Ok(plaintext)
    }
}
