// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Group message delivery over the push service.
//!
//! Recipients are resolved when the job runs, so membership changes made
//! while the job waited are honored. A resend for one failed recipient
//! uses the recipient filter and leaves everyone else alone.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::job::{Job, JobContext, JobParameters, JobSpec};
use super::requirement::Requirement;
use super::{now_millis, JobError};
use crate::events::SmsEvent;
use crate::protocol::Address;
use crate::push::{decode_group_id, GroupContext, GroupType, PushMessage, SendResult};
use crate::recipients::{canonicalize_number, Recipient, RecipientError, RecipientId};
use crate::storage::{
    self, FailureRecord, MessageId, OutgoingMediaMessage, OutgoingMessage, Storage, StorageError,
};

/// Runs allowed before a group send is given up.
pub const PUSH_GROUP_SEND_RETRY_COUNT: u32 = 5;

/// Delivers one stored group message to the group's members.
#[derive(Debug, Clone)]
pub struct PushGroupSendJob {
    message_id: MessageId,
    destination: String,
    filter_recipient: Option<RecipientId>,
    /// Recipients the last run targeted, for compensation on cancel.
    targets: Vec<RecipientId>,
}

impl PushGroupSendJob {
    /// Sends `message_id` to every current member of `destination`.
    pub fn new(message_id: MessageId, destination: impl Into<String>) -> Self {
        Self::from_parts(message_id, destination.into(), None)
    }

    /// Sends `message_id` to a single member only.
    pub fn for_recipient(
        message_id: MessageId,
        destination: impl Into<String>,
        recipient_id: RecipientId,
    ) -> Self {
        Self::from_parts(message_id, destination.into(), Some(recipient_id))
    }

    pub(crate) fn from_parts(
        message_id: MessageId,
        destination: String,
        filter_recipient: Option<RecipientId>,
    ) -> Self {
        PushGroupSendJob {
            message_id,
            destination,
            filter_recipient,
            targets: Vec::new(),
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn filter_recipient(&self) -> Option<RecipientId> {
        self.filter_recipient
    }

    /// Builds one filtered job per recipient with a recorded network
    /// failure, so only the failed subset is sent to again.
    pub fn resend_failed(
        storage: &Storage,
        message_id: MessageId,
    ) -> Result<Vec<PushGroupSendJob>, StorageError> {
        let record = storage.get_message_record(message_id)?;
        let jobs = storage
            .get_failures(message_id)?
            .into_iter()
            .filter(|failure| failure.kind == storage::FailureKind::Network)
            .map(|failure| {
                Self::for_recipient(message_id, record.destination.clone(), failure.recipient_id)
            })
            .collect();
        Ok(jobs)
    }

    fn resolve_recipients(&self, storage: &Storage) -> Result<Vec<Recipient>, StorageError> {
        match self.filter_recipient {
            Some(id) => Ok(vec![storage.get_recipient(id)?]),
            None => storage.get_group_members(&self.destination),
        }
    }

    /// Builds the envelope, or `None` for a group update with nothing in it.
    fn build_envelope(
        &self,
        message: &OutgoingMediaMessage,
    ) -> Result<Option<PushMessage>, JobError> {
        let group_id = decode_group_id(&self.destination)?;
        let timestamp = message.sent_timestamp;

        if message.flags.group_update || message.flags.group_quit {
            if message.body.trim().is_empty() {
                return Ok(None);
            }
            // Only name and members come from the body; the flags decide the type.
            let mut context = GroupContext::decode(&message.body)?;
            context.kind = if message.flags.group_quit {
                GroupType::Quit
            } else {
                GroupType::Update
            };
            context.id = group_id;
            context.avatar = message.attachments.first().cloned();
            return Ok(Some(PushMessage::group_context(timestamp, context)));
        }

        Ok(Some(PushMessage::deliver(
            timestamp,
            group_id,
            message.body.clone(),
            message.attachments.clone(),
        )))
    }

    fn fail_locally(&self, ctx: &JobContext, error: &RecipientError) -> Result<(), JobError> {
        warn!(message = %self.message_id, error = %error, "group send failed locally");
        storage::lock(&ctx.storage)?.mark_as_sent_failed(self.message_id)?;
        ctx.notify(SmsEvent::DeliveryFailed {
            message_id: self.message_id,
            destination: self.destination.clone(),
        });
        Ok(())
    }

    fn reconcile(
        &self,
        ctx: &JobContext,
        result: &SendResult,
        ids: &HashMap<String, RecipientId>,
    ) -> Result<(), JobError> {
        let storage = storage::lock(&ctx.storage)?;
        let id_of = |address: &Address| -> Result<RecipientId, JobError> {
            ids.get(address.name()).copied().ok_or_else(|| {
                JobError::Storage(StorageError::NotFound(format!(
                    "recipient for {}",
                    address.name()
                )))
            })
        };

        if let Some(filtered) = self.filter_recipient {
            storage.remove_failures_for_recipient(self.message_id, filtered)?;
            if !result.has_failures() {
                storage.remove_mismatched_identity(self.message_id, filtered)?;
            }
        }

        if !result.has_failures() {
            storage.mark_as_push(self.message_id)?;
            if storage.has_outstanding_failures(self.message_id)? {
                // Other recipients from an earlier run are still failed.
                storage.mark_as_sent_failed(self.message_id)?;
                info!(message = %self.message_id, "resend delivered, other failures remain");
                return Ok(());
            }
            storage.mark_as_secure(self.message_id)?;
            storage.mark_as_sent(self.message_id, now_millis())?;
            drop(storage);
            info!(message = %self.message_id, recipients = result.sent.len(), "group message sent");
            ctx.notify(SmsEvent::MessageSent {
                message_id: self.message_id,
            });
            return Ok(());
        }

        let mut failures = Vec::new();
        for address in &result.network_failures {
            failures.push(FailureRecord::network(id_of(address)?));
        }
        for address in &result.unregistered {
            failures.push(FailureRecord::unregistered(id_of(address)?));
        }
        storage.add_failures(self.message_id, &failures)?;

        for (address, identity_key) in &result.untrusted_identities {
            storage.add_mismatched_identity(self.message_id, id_of(address)?, identity_key)?;
        }

        storage.mark_as_sent_failed(self.message_id)?;
        storage.mark_as_push(self.message_id)?;
        drop(storage);

        warn!(
            message = %self.message_id,
            network = result.network_failures.len(),
            untrusted = result.untrusted_identities.len(),
            unregistered = result.unregistered.len(),
            "group message partially failed"
        );
        ctx.notify(SmsEvent::DeliveryFailed {
            message_id: self.message_id,
            destination: self.destination.clone(),
        });
        Ok(())
    }
}

impl Job for PushGroupSendJob {
    fn parameters(&self) -> JobParameters {
        JobParameters::builder()
            .persistent()
            .group_id(self.destination.clone())
            .requirement(Requirement::master_secret())
            .requirement(Requirement::network())
            .retry_count(PUSH_GROUP_SEND_RETRY_COUNT)
            .build()
    }

    fn spec(&self) -> JobSpec {
        JobSpec::PushGroupSend {
            message_id: self.message_id,
            destination: self.destination.clone(),
            filter_recipient: self.filter_recipient,
        }
    }

    fn on_added(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        storage::lock(&ctx.storage)?.mark_as_sending(self.message_id)?;
        Ok(())
    }

    fn on_run(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let (message, recipients) = {
            let storage = storage::lock(&ctx.storage)?;
            let message = match storage.get_outgoing_message(self.message_id)? {
                OutgoingMessage::Media(message) => message,
                OutgoingMessage::Text(_) => {
                    return Err(JobError::WrongMessageType(format!(
                        "message {} is not a group message",
                        self.message_id
                    )))
                }
            };
            (message, self.resolve_recipients(&storage)?)
        };
        self.targets = recipients.iter().map(|r| r.id).collect();

        // Push addresses must be full international numbers.
        let mut addresses = Vec::with_capacity(recipients.len());
        let mut ids = HashMap::with_capacity(recipients.len());
        for recipient in &recipients {
            let number = match push_number(&recipient.number) {
                Ok(number) => number,
                Err(e) => return self.fail_locally(ctx, &e),
            };
            ids.insert(number.clone(), recipient.id);
            addresses.push(Address::with_default_device(number));
        }

        let result = match self.build_envelope(&message)? {
            Some(envelope) => {
                debug!(
                    message = %self.message_id,
                    recipients = addresses.len(),
                    filtered = self.filter_recipient.is_some(),
                    "sending group message"
                );
                let mut sender = ctx.push.create(&ctx.push_config)?;
                sender.send_message(&addresses, &envelope)?
            }
            None => {
                debug!(message = %self.message_id, "empty group update, nothing to send");
                SendResult::all_sent(&[])
            }
        };

        self.reconcile(ctx, &result, &ids)
    }

    fn on_canceled(&mut self, ctx: &JobContext) {
        let storage = match storage::lock(&ctx.storage) {
            Ok(storage) => storage,
            Err(e) => {
                warn!(message = %self.message_id, error = %e, "cannot record canceled send");
                return;
            }
        };

        if let Err(e) = storage.mark_as_sent_failed(self.message_id) {
            warn!(message = %self.message_id, error = %e, "failed to mark message failed");
        }

        let targets = if self.targets.is_empty() {
            self.resolve_recipients(&storage)
                .map(|recipients| recipients.iter().map(|r| r.id).collect())
                .unwrap_or_default()
        } else {
            self.targets.clone()
        };
        let failures: Vec<_> = targets.into_iter().map(FailureRecord::network).collect();
        if let Err(e) = storage.add_failures(self.message_id, &failures) {
            warn!(message = %self.message_id, error = %e, "failed to record network failures");
        }
        drop(storage);

        ctx.notify(SmsEvent::DeliveryFailed {
            message_id: self.message_id,
            destination: self.destination.clone(),
        });
    }
}

/// Canonicalizes a number for the push service, which only knows E.164.
fn push_number(number: &str) -> Result<String, RecipientError> {
    let canonical = canonicalize_number(number)?;
    if !canonical.starts_with('+') {
        return Err(RecipientError::InvalidNumber(format!(
            "{} is not an international number",
            number
        )));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters() {
        let job = PushGroupSendJob::new(MessageId(1), "__textsecure_group__!01");
        let parameters = job.parameters();
        assert!(parameters.persistent);
        assert_eq!(parameters.group_id.as_deref(), Some("__textsecure_group__!01"));
        assert_eq!(parameters.retry_count, 5);
        let names: Vec<_> = parameters.requirements.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["master_secret", "network"]);
    }

    #[test]
    fn test_push_number_requires_international_form() {
        assert_eq!(push_number("+1 555 0001").unwrap(), "+15550001");
        assert!(matches!(
            push_number("5550001"),
            Err(RecipientError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_spec_round_trip_keeps_filter() {
        let job = PushGroupSendJob::for_recipient(MessageId(9), "__textsecure_group__!02", RecipientId(3));
        let json = job.spec().to_json().unwrap();
        assert_eq!(JobSpec::from_json(&json).unwrap(), job.spec());
    }
}
