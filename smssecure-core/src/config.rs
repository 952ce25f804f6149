//! Configuration
//!
//! Settings for storage, the push service, the job workers and the codec,
//! loadable from a JSON file. Missing sections take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::SymmetricKey;
use crate::push::PushServiceConfig;
use crate::storage::{Storage, StorageError};
use crate::transport::{CodecConfig, TransportCodec};

/// Configuration error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Job worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// First retry delay in milliseconds; doubles on each attempt.
    pub backoff_base_ms: u64,
    /// Upper bound on the retry delay in milliseconds.
    pub backoff_max_ms: u64,
    /// How often idle workers re-check requirements, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            workers: 2,
            backoff_base_ms: 1_000,
            backoff_max_ms: 3_600_000,
            poll_interval_ms: 500,
        }
    }
}

impl JobConfig {
    /// Delay before the attempt following `attempt` failed attempts.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let delay = self.backoff_base_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureSmsConfig {
    /// SQLite database path; `None` keeps everything in memory.
    pub storage_path: Option<PathBuf>,
    pub push: PushServiceConfig,
    pub jobs: JobConfig,
    pub codec: CodecConfig,
}

impl SecureSmsConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SecureSmsConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&json)
    }

    /// Checks value ranges. An empty push server URL means push is unused.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=255).contains(&self.codec.bucket_size) {
            return Err(ConfigError::Invalid(format!(
                "codec.bucket_size must be in 1..=255, got {}",
                self.codec.bucket_size
            )));
        }
        if self.jobs.workers == 0 {
            return Err(ConfigError::Invalid("jobs.workers must be at least 1".into()));
        }
        if self.jobs.backoff_base_ms == 0 || self.jobs.backoff_max_ms < self.jobs.backoff_base_ms
        {
            return Err(ConfigError::Invalid(
                "jobs backoff must satisfy 0 < backoff_base_ms <= backoff_max_ms".into(),
            ));
        }
        if !self.push.server_url.is_empty() {
            self.push
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Opens the configured database, or an in-memory one without a path.
    pub fn open_storage(&self, encryption_key: SymmetricKey) -> Result<Storage, StorageError> {
        match &self.storage_path {
            Some(path) => Storage::open(path, encryption_key),
            None => Storage::in_memory(encryption_key),
        }
    }

    /// Codec with the configured bucket size.
    pub fn transport_codec(&self) -> TransportCodec {
        TransportCodec::new(self.codec)
    }
}
