// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Database Schema Migration Framework
//!
//! Provides versioned schema migrations with transactional safety.
//! Each migration has a version number, name, and either SQL or a Rust callback.
//! The runner tracks applied versions in a `schema_version` table and runs
//! pending migrations in order within a single transaction.

use rusqlite::Connection;

use crate::crypto::SymmetricKey;
use crate::protocol::IdentityKeyPair;

use super::StorageError;

/// A single schema migration step.
pub struct Migration {
    /// Monotonically increasing version number (starting at 1).
    pub version: u32,
    /// Human-readable name for this migration.
    pub name: &'static str,
    /// The migration action: either SQL or a Rust callback.
    pub action: MigrationAction,
}

/// The action a migration performs.
pub enum MigrationAction {
    /// Pure SQL migration.
    Sql(&'static str),
    /// Rust callback migration (for data transformations that need encryption key).
    Callback(fn(&Connection, &SymmetricKey) -> Result<(), StorageError>),
}

/// Runs schema migrations against a database connection.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Runs all pending migrations in a transaction.
    ///
    /// Creates the `schema_version` table if it doesn't exist, then applies
    /// any migrations whose version is greater than the current schema version.
    /// All pending migrations run within a single transaction — if any migration
    /// fails, all changes are rolled back.
    pub fn run(
        conn: &Connection,
        key: &SymmetricKey,
        migrations: &[Migration],
    ) -> Result<(), StorageError> {
        // Create the schema_version table if it doesn't exist (outside transaction,
        // since we need to read it before starting the migration transaction).
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current_version = Self::current_version(conn)?;

        // Collect pending migrations
        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        // Verify migrations are in order
        for window in pending.windows(2) {
            if window[0].version >= window[1].version {
                return Err(StorageError::Migration(format!(
                    "Migrations are not in order: v{} before v{}",
                    window[0].version, window[1].version
                )));
            }
        }

        // Run all pending migrations in a single transaction
        conn.execute_batch("BEGIN EXCLUSIVE TRANSACTION;")?;

        for migration in &pending {
            match &migration.action {
                MigrationAction::Sql(sql) => {
                    if let Err(e) = conn.execute_batch(sql) {
                        conn.execute_batch("ROLLBACK;")?;
                        return Err(StorageError::Migration(format!(
                            "Migration v{} '{}' failed: {}",
                            migration.version, migration.name, e
                        )));
                    }
                }
                MigrationAction::Callback(cb) => {
                    if let Err(e) = cb(conn, key) {
                        conn.execute_batch("ROLLBACK;")?;
                        return Err(StorageError::Migration(format!(
                            "Migration v{} '{}' callback failed: {}",
                            migration.version, migration.name, e
                        )));
                    }
                }
            }

            let now = super::now_secs();

            if let Err(e) = conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, now as i64],
            ) {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StorageError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e
                )));
            }
        }

        conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    /// Returns the current schema version, or 0 if no migrations have been applied.
    pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
        // Check if schema_version table exists
        let table_exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        let version: Option<u32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap_or(None);

        Ok(version.unwrap_or(0))
    }
}

/// Returns all registered migrations in version order.
///
/// This is the single source of truth for the database schema.
/// New migrations are appended to the end of this list.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "baseline_schema",
            action: MigrationAction::Sql(MIGRATION_V1_BASELINE),
        },
        Migration {
            version: 2,
            name: "local_identity",
            action: MigrationAction::Callback(migrate_v2_local_identity),
        },
        Migration {
            version: 3,
            name: "message_sent_timestamp",
            action: MigrationAction::Sql(MIGRATION_V3_SENT_TIMESTAMP),
        },
    ]
}

/// Migration v2: generate our identity key pair, sealed with the storage key.
fn migrate_v2_local_identity(conn: &Connection, key: &SymmetricKey) -> Result<(), StorageError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM local_identity WHERE id = 1",
        [],
        |row| row.get(0),
    )?;
    if exists {
        return Ok(());
    }

    let identity = IdentityKeyPair::generate();
    let secret_encrypted = crate::crypto::encrypt(key, &identity.secret_bytes())
        .map_err(|e| StorageError::Encryption(e.to_string()))?;
    conn.execute(
        "INSERT INTO local_identity (id, public_key, secret_encrypted, created_at)
         VALUES (1, ?1, ?2, ?3)",
        rusqlite::params![
            identity.public_key().as_bytes().to_vec(),
            secret_encrypted,
            super::now_secs() as i64
        ],
    )?;
    Ok(())
}

/// Migration v1: Baseline schema.
const MIGRATION_V1_BASELINE: &str = "
    -- Recipients (canonical phone numbers)
    CREATE TABLE IF NOT EXISTS recipients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        number TEXT NOT NULL UNIQUE
    );

    -- Push groups
    CREATE TABLE IF NOT EXISTS groups (
        group_id TEXT PRIMARY KEY,
        title TEXT,
        avatar_encrypted BLOB,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS group_members (
        group_id TEXT NOT NULL,
        recipient_id INTEGER NOT NULL,
        PRIMARY KEY (group_id, recipient_id)
    );

    -- Outgoing messages (SMS and push)
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        transport TEXT NOT NULL,
        destination TEXT NOT NULL,
        body_encrypted BLOB NOT NULL,
        text_kind TEXT,
        flags INTEGER NOT NULL DEFAULT 0,
        attachments_encrypted BLOB,
        status TEXT NOT NULL,
        push INTEGER NOT NULL DEFAULT 0,
        secure INTEGER NOT NULL DEFAULT 0,
        sent_at INTEGER,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS message_failures (
        message_id INTEGER NOT NULL,
        recipient_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (message_id, recipient_id, kind)
    );

    CREATE TABLE IF NOT EXISTS mismatched_identities (
        message_id INTEGER NOT NULL,
        recipient_id INTEGER NOT NULL,
        identity_key BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (message_id, recipient_id)
    );

    -- Session protocol state
    CREATE TABLE IF NOT EXISTS sessions (
        name TEXT NOT NULL,
        device_id INTEGER NOT NULL,
        record_encrypted BLOB NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (name, device_id)
    );

    CREATE TABLE IF NOT EXISTS identities (
        name TEXT PRIMARY KEY,
        identity_key BLOB NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS prekeys (
        id INTEGER PRIMARY KEY,
        record_encrypted BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS local_identity (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        public_key BLOB NOT NULL,
        secret_encrypted BLOB NOT NULL,
        created_at INTEGER NOT NULL
    );

    -- Persistent jobs
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    -- Indexes
    CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);
    CREATE INDEX IF NOT EXISTS idx_failures_message ON message_failures(message_id);
    CREATE INDEX IF NOT EXISTS idx_mismatched_message ON mismatched_identities(message_id);
    CREATE INDEX IF NOT EXISTS idx_group_members_group ON group_members(group_id);
";

/// Migration v3: sender timestamp carried by push envelopes.
const MIGRATION_V3_SENT_TIMESTAMP: &str = "
    ALTER TABLE messages ADD COLUMN sent_timestamp INTEGER NOT NULL DEFAULT 0;
";

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let conn = open();
        let key = SymmetricKey::generate();
        MigrationRunner::run(&conn, &key, &all_migrations()).unwrap();
        assert_eq!(
            MigrationRunner::current_version(&conn).unwrap(),
            all_migrations().len() as u32
        );
    }

    #[test]
    fn test_rerun_is_noop() {
        let conn = open();
        let key = SymmetricKey::generate();
        MigrationRunner::run(&conn, &key, &all_migrations()).unwrap();
        let first: Vec<u8> = conn
            .query_row("SELECT public_key FROM local_identity", [], |row| row.get(0))
            .unwrap();
        MigrationRunner::run(&conn, &key, &all_migrations()).unwrap();
        let second: Vec<u8> = conn
            .query_row("SELECT public_key FROM local_identity", [], |row| row.get(0))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_out_of_order_migrations_rejected() {
        let conn = open();
        let key = SymmetricKey::generate();
        let migrations = vec![
            Migration {
                version: 2,
                name: "second",
                action: MigrationAction::Sql("CREATE TABLE b (x INTEGER);"),
            },
            Migration {
                version: 1,
                name: "first",
                action: MigrationAction::Sql("CREATE TABLE a (x INTEGER);"),
            },
        ];
        assert!(matches!(
            MigrationRunner::run(&conn, &key, &migrations),
            Err(StorageError::Migration(_))
        ));
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let conn = open();
        let key = SymmetricKey::generate();
        let migrations = vec![
            Migration {
                version: 1,
                name: "good",
                action: MigrationAction::Sql("CREATE TABLE a (x INTEGER);"),
            },
            Migration {
                version: 2,
                name: "bad",
                action: MigrationAction::Sql("NOT VALID SQL;"),
            },
        ];
        assert!(MigrationRunner::run(&conn, &key, &migrations).is_err());
        assert_eq!(MigrationRunner::current_version(&conn).unwrap(), 0);
    }
}
