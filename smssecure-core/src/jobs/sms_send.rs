//! Single SMS delivery through the cipher and the carrier.

use tracing::{debug, info, warn};

use super::job::{Job, JobContext, JobParameters, JobSpec};
use super::requirement::Requirement;
use super::{now_millis, JobError};
use crate::cipher::SmsCipher;
use crate::events::SmsEvent;
use crate::sms::TextKind;
use crate::storage::{self, MessageId, OutgoingMessage};

/// Runs allowed before an SMS send is given up.
pub const SMS_SEND_RETRY_COUNT: u32 = 15;

/// Delivers one stored SMS, encrypting it first when it is secure.
#[derive(Debug, Clone)]
pub struct SmsSendJob {
    message_id: MessageId,
    recipient: String,
}

impl SmsSendJob {
    pub fn new(message_id: MessageId, recipient: impl Into<String>) -> Self {
        SmsSendJob {
            message_id,
            recipient: recipient.into(),
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    fn fail(&self, ctx: &JobContext) -> Result<(), JobError> {
        storage::lock(&ctx.storage)?.mark_as_sent_failed(self.message_id)?;
        ctx.notify(SmsEvent::DeliveryFailed {
            message_id: self.message_id,
            destination: self.recipient.clone(),
        });
        Ok(())
    }
}

impl Job for SmsSendJob {
    fn parameters(&self) -> JobParameters {
        JobParameters::builder()
            .persistent()
            .group_id(self.recipient.clone())
            .requirement(Requirement::master_secret())
            .requirement(Requirement::network_or_service())
            .retry_count(SMS_SEND_RETRY_COUNT)
            .build()
    }

    fn spec(&self) -> JobSpec {
        JobSpec::SmsSend {
            message_id: self.message_id,
            recipient: self.recipient.clone(),
        }
    }

    fn on_added(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        storage::lock(&ctx.storage)?.mark_as_sending(self.message_id)?;
        Ok(())
    }

    fn on_run(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let message = match storage::lock(&ctx.storage)?.get_outgoing_message(self.message_id)? {
            OutgoingMessage::Text(message) => message,
            OutgoingMessage::Media(_) => {
                return Err(JobError::WrongMessageType(format!(
                    "message {} is not an SMS",
                    self.message_id
                )))
            }
        };

        let secure = message.kind.needs_encryption();
        let outgoing = if secure {
            let encrypted = {
                let mut protocol = ctx.protocol.lock().map_err(|_| JobError::Poisoned)?;
                SmsCipher::new(&mut *protocol, ctx.codec).encrypt(&message)
            };
            match encrypted {
                Ok(outgoing) => outgoing,
                Err(e) => {
                    // Cipher failures never reach the carrier.
                    warn!(message = %self.message_id, error = %e, "SMS encryption failed");
                    return self.fail(ctx);
                }
            }
        } else {
            message
        };

        debug!(message = %self.message_id, kind = outgoing.kind.as_str(), "sending SMS");
        ctx.sms.send_text(&outgoing)?;

        {
            let storage = storage::lock(&ctx.storage)?;
            if secure {
                storage.mark_as_secure(self.message_id)?;
            }
            storage.mark_as_sent(self.message_id, now_millis())?;
        }

        info!(message = %self.message_id, "SMS sent");
        ctx.notify(SmsEvent::MessageSent {
            message_id: self.message_id,
        });
        if outgoing.kind == TextKind::KeyExchange {
            ctx.notify(SmsEvent::KeyExchangeSent {
                recipient: outgoing.recipient,
            });
        }
        Ok(())
    }

    fn on_canceled(&mut self, ctx: &JobContext) {
        if let Err(e) = self.fail(ctx) {
            warn!(message = %self.message_id, error = %e, "failed to mark canceled SMS");
        }
    }
}
