//! Group id string form.

use super::PushError;

/// Prefix marking a destination as a push group.
pub const GROUP_ID_PREFIX: &str = "__textsecure_group__!";

/// Encodes raw group id bytes as a destination string.
pub fn encode_group_id(id: &[u8]) -> String {
    format!("{}{}", GROUP_ID_PREFIX, hex::encode(id))
}

/// Decodes a destination string back to raw group id bytes.
pub fn decode_group_id(group_id: &str) -> Result<Vec<u8>, PushError> {
    let encoded = group_id
        .strip_prefix(GROUP_ID_PREFIX)
        .ok_or_else(|| PushError::MalformedGroupContext(format!("not a group id: {}", group_id)))?;
    hex::decode(encoded).map_err(|e| PushError::MalformedGroupContext(e.to_string()))
}

/// Returns true if the destination names a group.
pub fn is_group_id(destination: &str) -> bool {
    destination.starts_with(GROUP_ID_PREFIX)
}
