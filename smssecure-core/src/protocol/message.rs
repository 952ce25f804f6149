//! Wire forms of protocol messages.
//!
//! Every message is one version byte (current version in both nibbles)
//! followed by the bincode body.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{IdentityKey, ProtocolError};

/// Current protocol version.
pub const CURRENT_VERSION: u8 = 3;

/// Flag set on a key exchange that starts a handshake.
pub const KEY_EXCHANGE_INITIATE: u8 = 0x01;
/// Flag set on a key exchange that answers an initiate.
pub const KEY_EXCHANGE_RESPONSE: u8 = 0x02;

fn version_byte() -> u8 {
    (CURRENT_VERSION << 4) | CURRENT_VERSION
}

fn serialize_versioned<T: Serialize>(body: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut out = vec![version_byte()];
    out.extend(
        bincode::serialize(body).map_err(|e| ProtocolError::Serialization(e.to_string()))?,
    );
    Ok(out)
}

/// Splits off and checks the version byte.
///
/// Older versions are `LegacyMessage`; newer ones are reported through
/// `unknown`, since the ordinary message type treats them as invalid while
/// handshake types report the version itself.
fn parse_versioned<T: DeserializeOwned>(
    bytes: &[u8],
    unknown: impl FnOnce(u8) -> ProtocolError,
) -> Result<T, ProtocolError> {
    let (&first, rest) = bytes
        .split_first()
        .ok_or_else(|| ProtocolError::InvalidMessage("empty message".to_string()))?;
    let version = first >> 4;
    if version < CURRENT_VERSION {
        return Err(ProtocolError::LegacyMessage);
    }
    if version > CURRENT_VERSION {
        return Err(unknown(version));
    }
    bincode::deserialize(rest).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
}

/// An ordinary message on an established session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperMessage {
    pub counter: u32,
    pub ciphertext: Vec<u8>,
}

impl WhisperMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        serialize_versioned(self)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        parse_versioned(bytes, |v| {
            ProtocolError::InvalidMessage(format!("unknown version: {}", v))
        })
    }
}

/// A message that bootstraps the session from one of our pre-keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyWhisperMessage {
    pub prekey_id: u32,
    pub base_key: [u8; 32],
    pub identity_key: IdentityKey,
    /// Serialized [`WhisperMessage`].
    pub message: Vec<u8>,
}

impl PreKeyWhisperMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        serialize_versioned(self)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        parse_versioned(bytes, ProtocolError::InvalidVersion)
    }
}

/// Handshake message exchanged to establish a session over SMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeMessage {
    pub sequence: u32,
    pub flags: u8,
    pub base_key: [u8; 32],
    pub identity_key: IdentityKey,
}

impl KeyExchangeMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        serialize_versioned(self)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        parse_versioned(bytes, ProtocolError::InvalidVersion)
    }

    pub fn is_initiate(&self) -> bool {
        self.flags & KEY_EXCHANGE_INITIATE != 0
    }

    pub fn is_response(&self) -> bool {
        self.flags & KEY_EXCHANGE_RESPONSE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_message_starts_with_version_byte() {
        let msg = WhisperMessage {
            counter: 4,
            ciphertext: vec![1, 2, 3],
        };
        let bytes = msg.serialize().unwrap();
        assert_eq!(bytes[0], 0x33);
        assert_eq!(WhisperMessage::parse(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_legacy_version_rejected() {
        let msg = WhisperMessage {
            counter: 1,
            ciphertext: vec![1, 2, 3],
        };
        let mut bytes = msg.serialize().unwrap();
        bytes[0] = 0x22;
        assert_eq!(WhisperMessage::parse(&bytes), Err(ProtocolError::LegacyMessage));
    }

    #[test]
    fn test_future_version_on_key_exchange() {
        let msg = KeyExchangeMessage {
            sequence: 7,
            flags: KEY_EXCHANGE_INITIATE,
            base_key: [1u8; 32],
            identity_key: IdentityKey::from_bytes([2u8; 32]),
        };
        let mut bytes = msg.serialize().unwrap();
        bytes[0] = 0x44;
        assert_eq!(
            KeyExchangeMessage::parse(&bytes),
            Err(ProtocolError::InvalidVersion(4))
        );
    }

    #[test]
    fn test_future_version_on_whisper_is_invalid() {
        let mut bytes = WhisperMessage {
            counter: 0,
            ciphertext: vec![],
        }
        .serialize()
        .unwrap();
        bytes[0] = 0x55;
        assert!(matches!(
            WhisperMessage::parse(&bytes),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_truncated_body_is_invalid() {
        let bytes = WhisperMessage {
            counter: 3,
            ciphertext: vec![9; 40],
        }
        .serialize()
        .unwrap();
        assert!(matches!(
            WhisperMessage::parse(&bytes[..6]),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            WhisperMessage::parse(&[]),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }
}
