// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Outgoing message storage operations.
//!
//! A message moves `Pending -> Sending -> Sent | SentFailed`. The `push` and
//! `secure` flags are set independently of the status. Per-recipient
//! failures and mismatched identities are itemized in their own tables.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{now_secs, Storage, StorageError};
use crate::protocol::IdentityKey;
use crate::push::Attachment;
use crate::recipients::RecipientId;
use crate::sms::{OutgoingTextMessage, TextKind};

/// Local database id of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel a message leaves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Sms,
    Push,
}

impl Transport {
    fn as_str(&self) -> &'static str {
        match self {
            Transport::Sms => "sms",
            Transport::Push => "push",
        }
    }

    fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "sms" => Ok(Transport::Sms),
            "push" => Ok(Transport::Push),
            other => Err(StorageError::Serialization(format!(
                "unknown transport: {}",
                other
            ))),
        }
    }
}

/// Persisted delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Sending,
    Sent,
    SentFailed,
}

impl MessageStatus {
    fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::SentFailed => "sent_failed",
        }
    }

    fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "sent_failed" => Ok(MessageStatus::SentFailed),
            other => Err(StorageError::Serialization(format!(
                "unknown status: {}",
                other
            ))),
        }
    }

    /// Returns true for `Sent` and `SentFailed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Sent | MessageStatus::SentFailed)
    }
}

/// Message semantics flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub end_session: bool,
    pub group_update: bool,
    pub group_quit: bool,
}

impl MessageFlags {
    const END_SESSION: i64 = 0x1;
    const GROUP_UPDATE: i64 = 0x2;
    const GROUP_QUIT: i64 = 0x4;

    fn to_bits(self) -> i64 {
        let mut bits = 0;
        if self.end_session {
            bits |= Self::END_SESSION;
        }
        if self.group_update {
            bits |= Self::GROUP_UPDATE;
        }
        if self.group_quit {
            bits |= Self::GROUP_QUIT;
        }
        bits
    }

    fn from_bits(bits: i64) -> Self {
        MessageFlags {
            end_session: bits & Self::END_SESSION != 0,
            group_update: bits & Self::GROUP_UPDATE != 0,
            group_quit: bits & Self::GROUP_QUIT != 0,
        }
    }
}

/// An outgoing push message addressed to a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMediaMessage {
    pub group_id: String,
    /// Text body, or the base64 group context for update/quit messages.
    pub body: String,
    pub attachments: Vec<Attachment>,
    pub flags: MessageFlags,
    /// Sender timestamp in milliseconds, reused by every retry and resend.
    pub sent_timestamp: u64,
}

/// An outgoing message as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    Text(OutgoingTextMessage),
    Media(OutgoingMediaMessage),
}

/// Status row of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub transport: Transport,
    pub destination: String,
    pub status: MessageStatus,
    pub push: bool,
    pub secure: bool,
    pub sent_at: Option<u64>,
    pub created_at: u64,
}

/// Kind of per-recipient delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The recipient could not be reached; eligible for a resend.
    Network,
    /// The push service does not know the recipient.
    Unregistered,
}

impl FailureKind {
    fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Unregistered => "unregistered",
        }
    }

    fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "network" => Ok(FailureKind::Network),
            "unregistered" => Ok(FailureKind::Unregistered),
            other => Err(StorageError::Serialization(format!(
                "unknown failure kind: {}",
                other
            ))),
        }
    }
}

/// One itemized delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FailureRecord {
    pub recipient_id: RecipientId,
    pub kind: FailureKind,
}

impl FailureRecord {
    pub fn network(recipient_id: RecipientId) -> Self {
        FailureRecord {
            recipient_id,
            kind: FailureKind::Network,
        }
    }

    pub fn unregistered(recipient_id: RecipientId) -> Self {
        FailureRecord {
            recipient_id,
            kind: FailureKind::Unregistered,
        }
    }
}

/// A recipient whose identity key no longer matched at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchedIdentity {
    pub recipient_id: RecipientId,
    pub identity_key: IdentityKey,
}

impl Storage {
    // === Message Operations ===

    /// Stores an outgoing SMS as `Pending`.
    pub fn insert_outgoing_text(
        &self,
        message: &OutgoingTextMessage,
    ) -> Result<MessageId, StorageError> {
        let body_encrypted = self.seal(message.body.as_bytes())?;
        let flags = MessageFlags {
            end_session: message.kind == TextKind::EndSession,
            ..MessageFlags::default()
        };
        self.conn.execute(
            "INSERT INTO messages
             (transport, destination, body_encrypted, text_kind, flags, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Transport::Sms.as_str(),
                message.recipient,
                body_encrypted,
                message.kind.as_str(),
                flags.to_bits(),
                MessageStatus::Pending.as_str(),
                now_secs() as i64,
            ],
        )?;
        Ok(MessageId(self.conn.last_insert_rowid()))
    }

    /// Stores an outgoing group message as `Pending`.
    pub fn insert_outgoing_media(
        &self,
        message: &OutgoingMediaMessage,
    ) -> Result<MessageId, StorageError> {
        let body_encrypted = self.seal(message.body.as_bytes())?;
        let attachments_json = serde_json::to_vec(&message.attachments)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let attachments_encrypted = self.seal(&attachments_json)?;
        self.conn.execute(
            "INSERT INTO messages
             (transport, destination, body_encrypted, flags, attachments_encrypted, status,
              sent_timestamp, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Transport::Push.as_str(),
                message.group_id,
                body_encrypted,
                message.flags.to_bits(),
                attachments_encrypted,
                MessageStatus::Pending.as_str(),
                message.sent_timestamp as i64,
                now_secs() as i64,
            ],
        )?;
        Ok(MessageId(self.conn.last_insert_rowid()))
    }

    /// Loads the content of an outgoing message.
    pub fn get_outgoing_message(&self, id: MessageId) -> Result<OutgoingMessage, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT transport, destination, body_encrypted, text_kind, flags,
                        attachments_encrypted, sent_timestamp
                 FROM messages WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<Vec<u8>>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StorageError::NoSuchMessage(id.0))?;

        let (
            transport,
            destination,
            body_encrypted,
            text_kind,
            flags,
            attachments_encrypted,
            sent_timestamp,
        ) = row;
        let body = String::from_utf8(self.open_sealed(&body_encrypted)?)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        match Transport::parse(&transport)? {
            Transport::Sms => {
                let kind = text_kind
                    .as_deref()
                    .map(TextKind::parse)
                    .transpose()
                    .map_err(StorageError::Serialization)?
                    .unwrap_or(TextKind::Text);
                Ok(OutgoingMessage::Text(OutgoingTextMessage {
                    recipient: destination,
                    body,
                    kind,
                }))
            }
            Transport::Push => {
                let attachments = match attachments_encrypted {
                    Some(encrypted) => serde_json::from_slice(&self.open_sealed(&encrypted)?)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    None => Vec::new(),
                };
                Ok(OutgoingMessage::Media(OutgoingMediaMessage {
                    group_id: destination,
                    body,
                    attachments,
                    flags: MessageFlags::from_bits(flags),
                    sent_timestamp: sent_timestamp as u64,
                }))
            }
        }
    }

    /// Loads the status row of a message.
    pub fn get_message_record(&self, id: MessageId) -> Result<MessageRecord, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, transport, destination, status, push, secure, sent_at, created_at
                 FROM messages WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i32>(4)? != 0,
                        row.get::<_, i32>(5)? != 0,
                        row.get::<_, Option<i64>>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StorageError::NoSuchMessage(id.0))?;

        Ok(MessageRecord {
            id: MessageId(row.0),
            transport: Transport::parse(&row.1)?,
            destination: row.2,
            status: MessageStatus::parse(&row.3)?,
            push: row.4,
            secure: row.5,
            sent_at: row.6.map(|t| t as u64),
            created_at: row.7 as u64,
        })
    }

    fn update_message(
        &self,
        id: MessageId,
        sql: &str,
        value: &dyn rusqlite::ToSql,
    ) -> Result<(), StorageError> {
        let rows_affected = self.conn.execute(sql, params![value, id.0])?;
        if rows_affected == 0 {
            return Err(StorageError::NoSuchMessage(id.0));
        }
        Ok(())
    }

    /// Marks a message `Sending`. Repeating it is harmless.
    pub fn mark_as_sending(&self, id: MessageId) -> Result<(), StorageError> {
        self.update_message(
            id,
            "UPDATE messages SET status = ?1 WHERE id = ?2",
            &MessageStatus::Sending.as_str(),
        )
    }

    /// Marks a message `Sent` with its sent timestamp.
    pub fn mark_as_sent(&self, id: MessageId, sent_at: u64) -> Result<(), StorageError> {
        self.update_message(
            id,
            "UPDATE messages SET status = 'sent', sent_at = ?1 WHERE id = ?2",
            &(sent_at as i64),
        )
    }

    /// Marks a message `SentFailed`.
    pub fn mark_as_sent_failed(&self, id: MessageId) -> Result<(), StorageError> {
        self.update_message(
            id,
            "UPDATE messages SET status = ?1 WHERE id = ?2",
            &MessageStatus::SentFailed.as_str(),
        )
    }

    /// Flags a message as sent over the push channel.
    pub fn mark_as_push(&self, id: MessageId) -> Result<(), StorageError> {
        self.update_message(id, "UPDATE messages SET push = ?1 WHERE id = ?2", &1i32)
    }

    /// Flags a message as end-to-end encrypted.
    pub fn mark_as_secure(&self, id: MessageId) -> Result<(), StorageError> {
        self.update_message(id, "UPDATE messages SET secure = ?1 WHERE id = ?2", &1i32)
    }

    // === Failure Operations ===

    /// Records per-recipient failures. Recording the same failure twice keeps one.
    pub fn add_failures(
        &self,
        id: MessageId,
        failures: &[FailureRecord],
    ) -> Result<(), StorageError> {
        let now = now_secs() as i64;
        for failure in failures {
            self.conn.execute(
                "INSERT OR IGNORE INTO message_failures (message_id, recipient_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.0, failure.recipient_id.0, failure.kind.as_str(), now],
            )?;
        }
        Ok(())
    }

    /// Returns the failures recorded for a message.
    pub fn get_failures(&self, id: MessageId) -> Result<Vec<FailureRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT recipient_id, kind FROM message_failures
             WHERE message_id = ?1 ORDER BY recipient_id, kind",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut failures = Vec::new();
        for row in rows {
            let (recipient_id, kind) = row?;
            failures.push(FailureRecord {
                recipient_id: RecipientId(recipient_id),
                kind: FailureKind::parse(&kind)?,
            });
        }
        Ok(failures)
    }

    /// Removes every failure recorded for one recipient of a message.
    pub fn remove_failures_for_recipient(
        &self,
        id: MessageId,
        recipient_id: RecipientId,
    ) -> Result<usize, StorageError> {
        let rows_affected = self.conn.execute(
            "DELETE FROM message_failures WHERE message_id = ?1 AND recipient_id = ?2",
            params![id.0, recipient_id.0],
        )?;
        Ok(rows_affected)
    }

    /// Records the identity key a recipient presented instead of the trusted one.
    pub fn add_mismatched_identity(
        &self,
        id: MessageId,
        recipient_id: RecipientId,
        identity_key: &IdentityKey,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO mismatched_identities
             (message_id, recipient_id, identity_key, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.0,
                recipient_id.0,
                identity_key.as_bytes().to_vec(),
                now_secs() as i64
            ],
        )?;
        Ok(())
    }

    /// Returns the mismatched identities recorded for a message.
    pub fn get_mismatched_identities(
        &self,
        id: MessageId,
    ) -> Result<Vec<MismatchedIdentity>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT recipient_id, identity_key FROM mismatched_identities
             WHERE message_id = ?1 ORDER BY recipient_id",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut identities = Vec::new();
        for row in rows {
            let (recipient_id, key) = row?;
            let key: [u8; 32] = key
                .try_into()
                .map_err(|_| StorageError::Serialization("bad identity key length".into()))?;
            identities.push(MismatchedIdentity {
                recipient_id: RecipientId(recipient_id),
                identity_key: IdentityKey::from_bytes(key),
            });
        }
        Ok(identities)
    }

    /// Drops a mismatched identity record once the user resolved it.
    pub fn remove_mismatched_identity(
        &self,
        id: MessageId,
        recipient_id: RecipientId,
    ) -> Result<bool, StorageError> {
        let rows_affected = self.conn.execute(
            "DELETE FROM mismatched_identities WHERE message_id = ?1 AND recipient_id = ?2",
            params![id.0, recipient_id.0],
        )?;
        Ok(rows_affected > 0)
    }

    /// Returns true while any failure or mismatched identity is recorded.
    pub fn has_outstanding_failures(&self, id: MessageId) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM message_failures WHERE message_id = ?1)
                  + (SELECT COUNT(*) FROM mismatched_identities WHERE message_id = ?1)",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
