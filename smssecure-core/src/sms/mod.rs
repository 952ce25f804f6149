// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SMS Messages and Transport
//!
//! Text messages as they travel over SMS, the wire prefix that tells the
//! receiver how to route a body, and the boundary to the carrier transport.

mod transport;

pub use transport::{MockSmsTransport, SmsError, SmsTransport};

use serde::{Deserialize, Serialize};

/// Kind of an SMS text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextKind {
    /// Plain unencrypted text.
    Text,
    /// Encrypted on an established session.
    SecureText,
    /// Encrypted and carrying the bootstrap for the session.
    PreKeyBundle,
    /// Session handshake message.
    KeyExchange,
    /// Encrypted end-of-session signal.
    EndSession,
}

impl TextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextKind::Text => "text",
            TextKind::SecureText => "secure_text",
            TextKind::PreKeyBundle => "prekey_bundle",
            TextKind::KeyExchange => "key_exchange",
            TextKind::EndSession => "end_session",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "text" => Ok(TextKind::Text),
            "secure_text" => Ok(TextKind::SecureText),
            "prekey_bundle" => Ok(TextKind::PreKeyBundle),
            "key_exchange" => Ok(TextKind::KeyExchange),
            "end_session" => Ok(TextKind::EndSession),
            other => Err(format!("unknown text kind: {}", other)),
        }
    }

    /// Returns true if bodies of this kind must go through the cipher
    /// before sending.
    pub fn needs_encryption(&self) -> bool {
        matches!(self, TextKind::SecureText | TextKind::EndSession)
    }

    /// Wire tag for kinds that carry one.
    pub fn wire_type(&self) -> Option<WireType> {
        match self {
            TextKind::Text => None,
            TextKind::SecureText => Some(WireType::SecureText),
            TextKind::PreKeyBundle => Some(WireType::PreKeyBundle),
            TextKind::KeyExchange => Some(WireType::KeyExchange),
            TextKind::EndSession => Some(WireType::EndSession),
        }
    }
}

/// Body prefix that tells the receiver which cipher operation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    SecureText,
    PreKeyBundle,
    KeyExchange,
    EndSession,
}

impl WireType {
    const ALL: [WireType; 4] = [
        WireType::SecureText,
        WireType::PreKeyBundle,
        WireType::KeyExchange,
        WireType::EndSession,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            WireType::SecureText => "?TSM",
            WireType::PreKeyBundle => "?TSP",
            WireType::KeyExchange => "?TSK",
            WireType::EndSession => "?TSE",
        }
    }

    /// Splits a received body into its wire type and payload.
    pub fn split(body: &str) -> Option<(WireType, &str)> {
        Self::ALL.iter().find_map(|wire_type| {
            body.strip_prefix(wire_type.prefix())
                .map(|payload| (*wire_type, payload))
        })
    }

    /// The text kind an incoming body of this wire type is received as.
    pub fn text_kind(&self) -> TextKind {
        match self {
            WireType::SecureText => TextKind::SecureText,
            WireType::PreKeyBundle => TextKind::PreKeyBundle,
            WireType::KeyExchange => TextKind::KeyExchange,
            WireType::EndSession => TextKind::EndSession,
        }
    }
}

/// An SMS about to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTextMessage {
    /// Canonical recipient number.
    pub recipient: String,
    pub body: String,
    pub kind: TextKind,
}

impl OutgoingTextMessage {
    pub fn new(recipient: impl Into<String>, body: impl Into<String>, kind: TextKind) -> Self {
        OutgoingTextMessage {
            recipient: recipient.into(),
            body: body.into(),
            kind,
        }
    }

    /// Returns a copy with the body replaced, as happens after encryption.
    pub fn with_body(&self, body: impl Into<String>, kind: TextKind) -> Self {
        OutgoingTextMessage {
            recipient: self.recipient.clone(),
            body: body.into(),
            kind,
        }
    }

    /// Body as written to the carrier, including the wire prefix.
    pub fn wire_body(&self) -> String {
        match self.kind.wire_type() {
            Some(wire_type) => format!("{}{}", wire_type.prefix(), self.body),
            None => self.body.clone(),
        }
    }
}

/// A received SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTextMessage {
    /// Canonical sender number.
    pub sender: String,
    pub body: String,
    /// Sender timestamp in milliseconds.
    pub sent_at: u64,
    pub kind: TextKind,
    pub end_session: bool,
}

impl IncomingTextMessage {
    /// Builds an incoming message from a raw carrier body, routing on its
    /// wire prefix.
    pub fn from_wire(sender: impl Into<String>, wire_body: &str, sent_at: u64) -> Self {
        let (kind, body) = match WireType::split(wire_body) {
            Some((wire_type, payload)) => (wire_type.text_kind(), payload),
            None => (TextKind::Text, wire_body),
        };
        IncomingTextMessage {
            sender: sender.into(),
            body: body.to_string(),
            sent_at,
            kind,
            end_session: kind == TextKind::EndSession,
        }
    }

    /// Returns a copy with the body replaced, as happens after decryption.
    pub fn with_body(&self, body: impl Into<String>) -> Self {
        IncomingTextMessage {
            body: body.into(),
            ..self.clone()
        }
    }
}
