// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage Module
//!
//! Local SQLite storage for recipients, groups, outgoing messages and their
//! per-recipient failures, session protocol state, and persisted jobs.
//! Session records, pre-keys, our identity secret and message bodies are
//! encrypted with the storage key before they are written.

mod error;
mod jobs;
mod messages;
mod recipients;
mod sessions;

pub mod migration;

pub use error::StorageError;
pub use jobs::JobRecord;
pub use messages::{
    FailureKind, FailureRecord, MessageFlags, MessageId, MessageRecord, MessageStatus,
    MismatchedIdentity, OutgoingMediaMessage, OutgoingMessage, Transport,
};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::crypto::SymmetricKey;

/// Storage shared between the job workers and the session protocol.
pub type SharedStorage = Arc<Mutex<Storage>>;

/// Locks shared storage, mapping a poisoned lock to an error.
pub fn lock(storage: &SharedStorage) -> Result<MutexGuard<'_, Storage>, StorageError> {
    storage.lock().map_err(|_| StorageError::Poisoned)
}

/// SQLite-based storage implementation.
///
/// Stores data in a local SQLite database with application-level encryption
/// for sensitive fields (session records, keys, message bodies).
pub struct Storage {
    conn: Connection,
    /// Encryption key derived from the user's master secret
    pub(crate) encryption_key: SymmetricKey,
}

impl Storage {
    /// Opens or creates a storage database at the given path.
    pub fn open<P: AsRef<Path>>(
        path: P,
        encryption_key: SymmetricKey,
    ) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Storage {
            conn,
            encryption_key,
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Creates an in-memory storage (for testing).
    pub fn in_memory(encryption_key: SymmetricKey) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Storage {
            conn,
            encryption_key,
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Wraps this storage for sharing across workers.
    pub fn into_shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    /// Runs all pending schema migrations.
    fn run_migrations(&self) -> Result<(), StorageError> {
        let migrations = migration::all_migrations();
        migration::MigrationRunner::run(&self.conn, &self.encryption_key, &migrations)
    }

    /// Returns the current schema version.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        migration::MigrationRunner::current_version(&self.conn)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        crate::crypto::encrypt(&self.encryption_key, plaintext)
            .map_err(|e| StorageError::Encryption(e.to_string()))
    }

    fn open_sealed(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StorageError> {
        crate::crypto::decrypt(&self.encryption_key, ciphertext)
            .map_err(|e| StorageError::Encryption(e.to_string()))
    }
}

/// Current time in seconds since the UNIX epoch.
pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_secs()
}
