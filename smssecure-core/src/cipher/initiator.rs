//! Session handshake initiation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::SmsSecureError;
use crate::protocol::{Address, SharedProtocol};
use crate::recipients::canonicalize_number;
use crate::sms::{OutgoingTextMessage, TextKind};
use crate::transport::TransportCodec;

/// Asks the user whether to start another handshake while one is pending.
pub trait ConfirmationPrompt: Send + Sync {
    /// Returns true to go ahead.
    fn confirm_key_exchange(&self, recipient: &str) -> bool;
}

/// Accepts an outgoing SMS for delivery.
pub trait SmsDispatcher: Send + Sync {
    fn dispatch(&self, message: OutgoingTextMessage) -> Result<(), SmsSecureError>;
}

/// What [`KeyExchangeInitiator::initiate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiateOutcome {
    /// The handshake message was handed to the dispatcher.
    Sent,
    /// The user declined; nothing was sent or stored.
    Declined,
}

/// Starts session handshakes with recipients.
pub struct KeyExchangeInitiator {
    protocol: SharedProtocol,
    codec: TransportCodec,
    dispatcher: Arc<dyn SmsDispatcher>,
    prompt: Arc<dyn ConfirmationPrompt>,
}

impl KeyExchangeInitiator {
    pub fn new(
        protocol: SharedProtocol,
        codec: TransportCodec,
        dispatcher: Arc<dyn SmsDispatcher>,
        prompt: Arc<dyn ConfirmationPrompt>,
    ) -> Self {
        KeyExchangeInitiator {
            protocol,
            codec,
            dispatcher,
            prompt,
        }
    }

    /// Starts a handshake with `recipient`.
    ///
    /// With `confirm_if_pending`, an unanswered earlier handshake makes the
    /// prompt ask first; declining leaves everything untouched.
    pub fn initiate(
        &self,
        recipient: &str,
        confirm_if_pending: bool,
    ) -> Result<InitiateOutcome, SmsSecureError> {
        let number = canonicalize_number(recipient)?;
        let address = Address::with_default_device(number.as_str());

        if confirm_if_pending {
            let pending = self
                .protocol
                .lock()
                .map_err(|_| SmsSecureError::Poisoned)?
                .has_pending_key_exchange(&address)?;
            // The prompt runs without the protocol lock held.
            if pending && !self.prompt.confirm_key_exchange(&number) {
                debug!(recipient = %address, "key exchange declined");
                return Ok(InitiateOutcome::Declined);
            }
        }

        let handshake = self
            .protocol
            .lock()
            .map_err(|_| SmsSecureError::Poisoned)?
            .initiate_key_exchange(&address)?;

        let message =
            OutgoingTextMessage::new(number, self.codec.encode(&handshake), TextKind::KeyExchange);
        self.dispatcher.dispatch(message)?;
        info!(recipient = %address, "key exchange sent");
        Ok(InitiateOutcome::Sent)
    }
}
