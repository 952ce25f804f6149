//! Push envelopes and group context.

use serde::{Deserialize, Serialize};

use super::PushError;
use crate::transport;

/// An attachment carried by a push message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Attachment {
    pub fn new(content_type: &str, data: Vec<u8>) -> Self {
        Attachment {
            content_type: content_type.to_string(),
            data,
        }
    }
}

/// What a group envelope does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupType {
    /// Ordinary message to the group.
    Deliver,
    /// Membership, name or avatar change.
    Update,
    /// The sender leaves the group.
    Quit,
}

/// Group metadata carried by a push envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupContext {
    pub kind: GroupType,
    pub id: Vec<u8>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub avatar: Option<Attachment>,
}

impl GroupContext {
    /// Context that only names the group, used on ordinary deliveries.
    pub fn deliver(id: Vec<u8>) -> Self {
        GroupContext {
            kind: GroupType::Deliver,
            id,
            name: None,
            members: Vec::new(),
            avatar: None,
        }
    }

    /// Encodes the context as a message body.
    pub fn encode(&self) -> Result<String, PushError> {
        let json =
            serde_json::to_vec(self).map_err(|e| PushError::MalformedGroupContext(e.to_string()))?;
        Ok(transport::encode(&json))
    }

    /// Decodes a context from a message body.
    pub fn decode(body: &str) -> Result<Self, PushError> {
        let json =
            transport::decode(body).map_err(|e| PushError::MalformedGroupContext(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| PushError::MalformedGroupContext(e.to_string()))
    }
}

/// One envelope handed to the push sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    /// Sender timestamp in milliseconds.
    pub timestamp: u64,
    pub group: GroupContext,
    pub body: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl PushMessage {
    /// Envelope for a group update or quit; the body is the context itself.
    pub fn group_context(timestamp: u64, group: GroupContext) -> Self {
        PushMessage {
            timestamp,
            group,
            body: None,
            attachments: Vec::new(),
        }
    }

    /// Envelope for an ordinary group message.
    pub fn deliver(
        timestamp: u64,
        group_id: Vec<u8>,
        body: String,
        attachments: Vec<Attachment>,
    ) -> Self {
        PushMessage {
            timestamp,
            group: GroupContext::deliver(group_id),
            body: Some(body),
            attachments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_context_body_form() {
        let context = GroupContext {
            kind: GroupType::Update,
            id: vec![1, 2, 3],
            name: Some("Climbing".to_string()),
            members: vec!["+15550001".to_string(), "+15550002".to_string()],
            avatar: None,
        };
        let body = context.encode().unwrap();
        assert!(!body.contains('='));
        assert_eq!(GroupContext::decode(&body).unwrap(), context);
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        assert!(matches!(
            GroupContext::decode("not base64 at all!"),
            Err(PushError::MalformedGroupContext(_))
        ));
        assert!(matches!(
            GroupContext::decode("aGVsbG8"),
            Err(PushError::MalformedGroupContext(_))
        ));
    }
}
