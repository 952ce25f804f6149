// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SMS Transport Codec
//!
//! Turns ciphertext into something an SMS carrier will deliver intact.
//!
//! Outgoing plaintext is padded to a fixed bucket before encryption so the
//! ciphertext length leaks less about the message, and the resulting
//! ciphertext is base64 encoded without `=` padding. Incoming bodies go
//! through the inverse steps.

mod encoding;
mod padding;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use encoding::{decode, encode};
pub use padding::{pad, strip_padding, DEFAULT_BUCKET_SIZE, PADDING_MARKER};

/// Transport codec error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Malformed padding: {0}")]
    MalformedPadding(String),

    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),
}

/// Codec configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Padding bucket size in bytes.
    pub bucket_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

/// Stateless codec bound to a bucket size.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportCodec {
    config: CodecConfig,
}

impl TransportCodec {
    /// Creates a codec with the given configuration.
    pub fn new(config: CodecConfig) -> Self {
        TransportCodec { config }
    }

    /// Returns the bucket size used for padding.
    pub fn bucket_size(&self) -> usize {
        self.config.bucket_size
    }

    /// Pads a plaintext body to the next bucket boundary.
    pub fn pad(&self, body: &[u8]) -> Vec<u8> {
        pad(body, self.config.bucket_size)
    }

    /// Removes padding added by [`TransportCodec::pad`].
    pub fn strip_padding(&self, padded: &[u8]) -> Result<Vec<u8>, TransportError> {
        strip_padding(padded, self.config.bucket_size)
    }

    /// Encodes ciphertext for the SMS body.
    pub fn encode(&self, bytes: &[u8]) -> String {
        encode(bytes)
    }

    /// Decodes an SMS body back into ciphertext.
    pub fn decode(&self, text: &str) -> Result<Vec<u8>, TransportError> {
        decode(text)
    }
}
