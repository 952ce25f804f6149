//! Recipient and group storage operations.

use rusqlite::{params, OptionalExtension};

use super::{now_secs, Storage, StorageError};
use crate::recipients::{canonicalize_number, Recipient, RecipientId};

impl Storage {
    // === Recipient Operations ===

    /// Resolves a number to its recipient, creating the recipient if new.
    pub fn recipient_for_number(&self, number: &str) -> Result<Recipient, StorageError> {
        let number = canonicalize_number(number)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO recipients (number) VALUES (?1)",
            params![number],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM recipients WHERE number = ?1",
            params![number],
            |row| row.get(0),
        )?;
        Ok(Recipient {
            id: RecipientId(id),
            number,
        })
    }

    /// Loads a recipient by id.
    pub fn get_recipient(&self, id: RecipientId) -> Result<Recipient, StorageError> {
        self.conn
            .query_row(
                "SELECT id, number FROM recipients WHERE id = ?1",
                params![id.0],
                row_to_recipient,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("recipient {}", id)))
    }

    // === Group Operations ===

    /// Creates a group with the given members.
    pub fn create_group(
        &self,
        group_id: &str,
        title: Option<&str>,
        members: &[RecipientId],
    ) -> Result<(), StorageError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO groups (group_id, title, created_at) VALUES (?1, ?2, ?3)",
            params![group_id, title, now_secs() as i64],
        )?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists(format!("group {}", group_id)));
        }
        for member in members {
            self.add_group_member(group_id, *member)?;
        }
        Ok(())
    }

    /// Adds a member to a group.
    pub fn add_group_member(
        &self,
        group_id: &str,
        recipient_id: RecipientId,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, recipient_id) VALUES (?1, ?2)",
            params![group_id, recipient_id.0],
        )?;
        Ok(())
    }

    /// Removes a member from a group.
    pub fn remove_group_member(
        &self,
        group_id: &str,
        recipient_id: RecipientId,
    ) -> Result<bool, StorageError> {
        let rows_affected = self.conn.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND recipient_id = ?2",
            params![group_id, recipient_id.0],
        )?;
        Ok(rows_affected > 0)
    }

    /// Returns the current members of a group, ordered by recipient id.
    pub fn get_group_members(&self, group_id: &str) -> Result<Vec<Recipient>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.number FROM group_members m
             JOIN recipients r ON r.id = m.recipient_id
             WHERE m.group_id = ?1 ORDER BY r.id",
        )?;

        let rows = stmt.query_map(params![group_id], row_to_recipient)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }
}

/// Converts database row to Recipient.
fn row_to_recipient(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: RecipientId(row.get(0)?),
        number: row.get(1)?,
    })
}
