// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error Types and Classification
//!
//! Every error in the crate falls into exactly one [`ErrorClass`]. The job
//! layer decides retries and persisted outcomes from the class alone.

use thiserror::Error;

use crate::cipher::CipherError;
use crate::config::ConfigError;
use crate::jobs::JobError;
use crate::protocol::ProtocolError;
use crate::push::PushError;
use crate::recipients::RecipientError;
use crate::sms::SmsError;
use crate::storage::StorageError;
use crate::transport::TransportError;

/// How an error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The message can never be processed. Not retried.
    ProtocolPermanent,
    /// Needs the user to resolve an identity question. Not retried.
    Trust,
    /// Network trouble; retried with backoff.
    Transient,
    /// Malformed recipient or message input. Not retried.
    InputValidation,
    /// A fault of this device (storage, serialization, configuration).
    Local,
}

impl ErrorClass {
    /// Only transient errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Unified error type.
#[derive(Error, Debug)]
pub enum SmsSecureError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Push error: {0}")]
    Push(#[from] PushError),

    #[error("SMS error: {0}")]
    Sms(#[from] SmsError),

    #[error("Recipient error: {0}")]
    Recipient(#[from] RecipientError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lock poisoned")]
    Poisoned,
}

impl SmsSecureError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SmsSecureError::Transport(e) => e.class(),
            SmsSecureError::Protocol(e) => e.class(),
            SmsSecureError::Cipher(e) => e.class(),
            SmsSecureError::Storage(e) => e.class(),
            SmsSecureError::Push(e) => e.class(),
            SmsSecureError::Sms(e) => e.class(),
            SmsSecureError::Recipient(e) => e.class(),
            SmsSecureError::Job(e) => e.class(),
            SmsSecureError::Config(_) | SmsSecureError::Poisoned => ErrorClass::Local,
        }
    }
}

impl TransportError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::ProtocolPermanent
    }
}

impl ProtocolError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProtocolError::UntrustedIdentity { .. } | ProtocolError::StaleKeyExchange => {
                ErrorClass::Trust
            }
            ProtocolError::Store(_) | ProtocolError::Serialization(_) => ErrorClass::Local,
            ProtocolError::NoSession(_)
            | ProtocolError::InvalidMessage(_)
            | ProtocolError::LegacyMessage
            | ProtocolError::InvalidVersion(_)
            | ProtocolError::DuplicateMessage
            | ProtocolError::InvalidKeyId(_)
            | ProtocolError::InvalidKey(_) => ErrorClass::ProtocolPermanent,
        }
    }
}

impl CipherError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CipherError::UntrustedIdentity { .. } | CipherError::StaleKeyExchange => {
                ErrorClass::Trust
            }
            CipherError::Store(_) | CipherError::Encoding(_) => ErrorClass::Local,
            CipherError::NoSession(_)
            | CipherError::InvalidMessage(_)
            | CipherError::LegacyMessage
            | CipherError::InvalidVersion(_)
            | CipherError::DuplicateMessage
            | CipherError::MalformedPadding(_)
            | CipherError::MalformedEncoding(_) => ErrorClass::ProtocolPermanent,
        }
    }
}

impl StorageError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StorageError::Recipient(_) => ErrorClass::InputValidation,
            _ => ErrorClass::Local,
        }
    }
}

impl PushError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PushError::Network(_) => ErrorClass::Transient,
            PushError::Rejected(_) => ErrorClass::ProtocolPermanent,
            PushError::MalformedGroupContext(_) => ErrorClass::InputValidation,
            PushError::Unauthorized(_) | PushError::InvalidConfig(_) => ErrorClass::Local,
        }
    }
}

impl SmsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SmsError::Unavailable(_) => ErrorClass::Transient,
            SmsError::Rejected(_) => ErrorClass::ProtocolPermanent,
        }
    }
}

impl RecipientError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::InputValidation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::IdentityKey;

    #[test]
    fn test_only_network_errors_retry() {
        assert!(PushError::Network("timeout".into()).class().is_retryable());
        assert!(SmsError::Unavailable("no signal".into()).class().is_retryable());
        assert!(!PushError::Rejected("413".into()).class().is_retryable());
        assert!(!CipherError::NoSession("+15550001".into()).class().is_retryable());
    }

    #[test]
    fn test_trust_errors() {
        let untrusted = CipherError::UntrustedIdentity {
            name: "+15550001".into(),
            identity_key: IdentityKey::from_bytes([7u8; 32]),
        };
        assert_eq!(untrusted.class(), ErrorClass::Trust);
        assert_eq!(CipherError::StaleKeyExchange.class(), ErrorClass::Trust);
    }

    #[test]
    fn test_decode_failures_are_permanent() {
        for err in [
            CipherError::LegacyMessage,
            CipherError::InvalidVersion(9),
            CipherError::DuplicateMessage,
            CipherError::MalformedPadding("x".into()),
            CipherError::MalformedEncoding("x".into()),
        ] {
            assert_eq!(err.class(), ErrorClass::ProtocolPermanent);
        }
    }

    #[test]
    fn test_recipient_errors_are_input_validation() {
        let err: SmsSecureError = RecipientError::InvalidNumber("12".into()).into();
        assert_eq!(err.class(), ErrorClass::InputValidation);
        let storage: SmsSecureError =
            StorageError::Recipient(RecipientError::Formatting("x".into())).into();
        assert_eq!(storage.class(), ErrorClass::InputValidation);
    }

    #[test]
    fn test_local_failures_are_not_retried() {
        let encoding: CipherError = ProtocolError::Serialization("too large".into()).into();
        assert_eq!(encoding, CipherError::Encoding("too large".into()));
        assert_eq!(encoding.class(), ErrorClass::Local);
        assert!(!JobError::Panicked("boom".into()).class().is_retryable());
    }
}
