// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent job storage operations.

use rusqlite::params;

use super::{Storage, StorageError};

/// A persisted job: its serialized description and attempt count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: String,
    pub payload: String,
    pub attempts: u32,
    pub created_at: u64,
}

impl Storage {
    // === Job Operations ===

    /// Persists a new job.
    pub fn insert_job(&self, record: &JobRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO jobs (id, payload, attempts, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.payload,
                record.attempts as i32,
                record.created_at as i64,
            ],
        )?;
        Ok(())
    }

    /// Updates the attempt count of a job.
    pub fn update_job_attempts(&self, id: &str, attempts: u32) -> Result<bool, StorageError> {
        let rows_affected = self.conn.execute(
            "UPDATE jobs SET attempts = ?1 WHERE id = ?2",
            params![attempts as i32, id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Deletes a finished job.
    pub fn delete_job(&self, id: &str) -> Result<bool, StorageError> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }

    /// Loads all persisted jobs in creation order.
    pub fn load_jobs(&self) -> Result<Vec<JobRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload, attempts, created_at FROM jobs ORDER BY created_at, rowid",
        )?;

        let rows = stmt.query_map([], row_to_job_record)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Counts the persisted jobs.
    pub fn count_jobs(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Converts database row to JobRecord.
fn row_to_job_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        payload: row.get(1)?,
        attempts: row.get::<_, i32>(2)? as u32,
        created_at: row.get::<_, i64>(3)? as u64,
    })
}
