//! Session protocol state storage operations.

use rusqlite::{params, OptionalExtension};

use super::{now_secs, Storage, StorageError};
use crate::protocol::{
    Address, IdentityKey, IdentityKeyPair, IdentityKeyStore, PreKeyRecord, PreKeyStore,
    SessionRecord, SessionStore,
};

impl SessionStore for Storage {
    fn load_session(&self, address: &Address) -> Result<SessionRecord, StorageError> {
        let encrypted: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT record_encrypted FROM sessions WHERE name = ?1 AND device_id = ?2",
                params![address.name(), address.device_id()],
                |row| row.get(0),
            )
            .optional()?;

        match encrypted {
            Some(encrypted) => {
                let bytes = self.open_sealed(&encrypted)?;
                SessionRecord::from_bytes(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            }
            None => Ok(SessionRecord::default()),
        }
    }

    fn store_session(
        &self,
        address: &Address,
        record: &SessionRecord,
    ) -> Result<(), StorageError> {
        if record.is_empty() {
            return self.delete_session(address);
        }

        let bytes = record
            .to_bytes()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let encrypted = self.seal(&bytes)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO sessions (name, device_id, record_encrypted, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                address.name(),
                address.device_id(),
                encrypted,
                now_secs() as i64
            ],
        )?;
        Ok(())
    }

    fn delete_session(&self, address: &Address) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM sessions WHERE name = ?1 AND device_id = ?2",
            params![address.name(), address.device_id()],
        )?;
        Ok(())
    }
}

impl IdentityKeyStore for Storage {
    fn local_identity(&self) -> Result<IdentityKeyPair, StorageError> {
        let encrypted: Vec<u8> = self
            .conn
            .query_row(
                "SELECT secret_encrypted FROM local_identity WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound("local identity".to_string()))?;

        let secret: [u8; 32] = self
            .open_sealed(&encrypted)?
            .try_into()
            .map_err(|_| StorageError::Serialization("bad identity secret length".into()))?;
        Ok(IdentityKeyPair::from_secret_bytes(secret))
    }

    fn save_identity(&self, name: &str, identity: &IdentityKey) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO identities (name, identity_key, updated_at)
             VALUES (?1, ?2, ?3)",
            params![name, identity.as_bytes().to_vec(), now_secs() as i64],
        )?;
        Ok(())
    }

    fn load_identity(&self, name: &str) -> Result<Option<IdentityKey>, StorageError> {
        let key: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT identity_key FROM identities WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        key.map(|bytes| {
            let bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| StorageError::Serialization("bad identity key length".into()))?;
            Ok(IdentityKey::from_bytes(bytes))
        })
        .transpose()
    }
}

impl PreKeyStore for Storage {
    fn load_prekey(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        let encrypted: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT record_encrypted FROM prekeys WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        encrypted
            .map(|encrypted| {
                let bytes = self.open_sealed(&encrypted)?;
                bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    fn store_prekey(&self, record: &PreKeyRecord) -> Result<(), StorageError> {
        let bytes =
            bincode::serialize(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let encrypted = self.seal(&bytes)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO prekeys (id, record_encrypted) VALUES (?1, ?2)",
            params![record.id, encrypted],
        )?;
        Ok(())
    }

    fn remove_prekey(&self, id: u32) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM prekeys WHERE id = ?1", params![id])?;
        Ok(())
    }
}

impl Storage {
    /// Replaces the stored identity for `name` after the user accepted a new
    /// key, dropping the sessions built on the old one.
    pub fn accept_identity(&self, name: &str, identity: &IdentityKey) -> Result<(), StorageError> {
        self.save_identity(name, identity)?;
        self.conn
            .execute("DELETE FROM sessions WHERE name = ?1", params![name])?;
        Ok(())
    }
}
