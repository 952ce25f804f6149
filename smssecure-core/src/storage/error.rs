//! Storage error types.

use thiserror::Error;

use crate::recipients::RecipientError;

/// Storage error types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("No such message: {0}")]
    NoSuchMessage(i64),

    #[error("Invalid recipient: {0}")]
    Recipient(#[from] RecipientError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}
