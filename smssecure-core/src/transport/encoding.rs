//! Base64 body encoding without `=` padding.
//!
//! The standard alphabet is inside the GSM 7-bit default set, so encoded
//! bodies survive carriers that would mangle raw bytes.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

use super::TransportError;

const SMS_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes bytes for an SMS body.
pub fn encode(bytes: &[u8]) -> String {
    SMS_BASE64.encode(bytes)
}

/// Decodes an SMS body. Trailing `=` is tolerated for older senders.
pub fn decode(text: &str) -> Result<Vec<u8>, TransportError> {
    SMS_BASE64
        .decode(text.trim_end())
        .map_err(|e| TransportError::MalformedEncoding(e.to_string()))
}
