// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Job Execution
//!
//! Outgoing messages are delivered by jobs: units of work that wait on
//! requirements, run on a worker pool, retry transient failures with
//! exponential backoff, and always leave their message in a terminal state.
//!
//! # Flow
//!
//! 1. [`JobManager::add`] persists the job and runs [`Job::on_added`].
//! 2. The job waits until its requirements hold and no other job of its
//!    group is running.
//! 3. [`Job::on_run`] runs; a transient error schedules a retry.
//! 4. Retry exhaustion, a terminal error or cancellation runs
//!    [`Job::on_canceled`].

mod job;
mod manager;
mod push_group_send;
mod queue;
mod requirement;
mod sms_send;

pub use job::{Job, JobContext, JobParameters, JobParametersBuilder, JobSpec};
pub use manager::{JobId, JobManager, JobWorkers};
pub use push_group_send::PushGroupSendJob;
pub use requirement::{JobEnvironment, Requirement, RequirementKind};
pub use sms_send::SmsSendJob;

use thiserror::Error;

use crate::cipher::CipherError;
use crate::error::ErrorClass;
use crate::push::PushError;
use crate::recipients::RecipientError;
use crate::sms::SmsError;
use crate::storage::StorageError;

/// Job error types.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Push error: {0}")]
    Push(#[from] PushError),

    #[error("SMS error: {0}")]
    Sms(#[from] SmsError),

    #[error("Recipient error: {0}")]
    Recipient(#[from] RecipientError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unexpected message type for job: {0}")]
    WrongMessageType(String),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Lock poisoned")]
    Poisoned,
}

impl JobError {
    pub fn class(&self) -> ErrorClass {
        match self {
            JobError::Storage(e) => e.class(),
            JobError::Cipher(e) => e.class(),
            JobError::Push(e) => e.class(),
            JobError::Sms(e) => e.class(),
            JobError::Recipient(e) => e.class(),
            JobError::Serialization(_)
            | JobError::WrongMessageType(_)
            | JobError::Panicked(_)
            | JobError::Poisoned => ErrorClass::Local,
        }
    }
}

/// Current time in milliseconds since the UNIX epoch.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_millis() as u64
}
