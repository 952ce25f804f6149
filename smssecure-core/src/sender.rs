//! Outgoing message entry point.

use tracing::debug;

use crate::cipher::SmsDispatcher;
use crate::error::SmsSecureError;
use crate::jobs::{JobManager, PushGroupSendJob, SmsSendJob};
use crate::recipients::canonicalize_number;
use crate::sms::OutgoingTextMessage;
use crate::storage::{self, MessageId, OutgoingMediaMessage};

/// Persists outgoing messages and enqueues the jobs that deliver them.
#[derive(Clone)]
pub struct MessageSender {
    jobs: JobManager,
}

impl MessageSender {
    pub fn new(jobs: JobManager) -> Self {
        MessageSender { jobs }
    }

    /// Stores an SMS and schedules its delivery.
    pub fn send_text(&self, message: OutgoingTextMessage) -> Result<MessageId, SmsSecureError> {
        let recipient = canonicalize_number(&message.recipient)?;
        let message = OutgoingTextMessage {
            recipient: recipient.clone(),
            ..message
        };
        let id = storage::lock(&self.jobs.context().storage)?.insert_outgoing_text(&message)?;
        self.jobs.add(Box::new(SmsSendJob::new(id, recipient)))?;
        debug!(message = %id, kind = message.kind.as_str(), "SMS queued");
        Ok(id)
    }

    /// Stores a group message and schedules its delivery.
    pub fn send_group(&self, message: OutgoingMediaMessage) -> Result<MessageId, SmsSecureError> {
        let id = storage::lock(&self.jobs.context().storage)?.insert_outgoing_media(&message)?;
        self.jobs
            .add(Box::new(PushGroupSendJob::new(id, message.group_id.clone())))?;
        debug!(message = %id, group = %message.group_id, "group message queued");
        Ok(id)
    }

    /// Schedules a resend to every recipient with a network failure.
    /// Returns the number of jobs added.
    pub fn resend_failed(&self, message_id: MessageId) -> Result<usize, SmsSecureError> {
        let jobs = {
            let storage = storage::lock(&self.jobs.context().storage)?;
            PushGroupSendJob::resend_failed(&storage, message_id)?
        };
        let count = jobs.len();
        for job in jobs {
            self.jobs.add(Box::new(job))?;
        }
        Ok(count)
    }
}

impl SmsDispatcher for MessageSender {
    fn dispatch(&self, message: OutgoingTextMessage) -> Result<(), SmsSecureError> {
        self.send_text(message).map(|_| ())
    }
}
