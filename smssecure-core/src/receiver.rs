// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Incoming SMS routing.
//!
//! Routes a received body by its wire type to the matching cipher
//! operation. Handshake responses go back out through the dispatcher.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cipher::{SmsCipher, SmsDispatcher, END_SESSION_SIGNAL};
use crate::error::SmsSecureError;
use crate::events::{EventDispatcher, SmsEvent};
use crate::protocol::SharedProtocol;
use crate::sms::{IncomingTextMessage, OutgoingTextMessage, TextKind};
use crate::transport::TransportCodec;

/// What became of a received SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A text ready to be stored, decrypted if it was secure.
    Text(IncomingTextMessage),
    /// A handshake message; `responded` tells whether a reply was sent.
    KeyExchange { responded: bool },
}

enum Routed {
    Text(IncomingTextMessage),
    Response(Option<OutgoingTextMessage>),
}

/// Decrypts and routes incoming SMS.
pub struct MessageReceiver {
    protocol: SharedProtocol,
    codec: TransportCodec,
    dispatcher: Arc<dyn SmsDispatcher>,
    events: Arc<EventDispatcher>,
}

impl MessageReceiver {
    pub fn new(
        protocol: SharedProtocol,
        codec: TransportCodec,
        dispatcher: Arc<dyn SmsDispatcher>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        MessageReceiver {
            protocol,
            codec,
            dispatcher,
            events,
        }
    }

    pub fn receive(&self, message: IncomingTextMessage) -> Result<Received, SmsSecureError> {
        let routed = {
            let mut protocol = self.protocol.lock().map_err(|_| SmsSecureError::Poisoned)?;
            let mut cipher = SmsCipher::new(&mut *protocol, self.codec);
            match message.kind {
                TextKind::Text => Ok(Routed::Text(message.clone())),
                TextKind::SecureText | TextKind::EndSession => {
                    cipher.decrypt(&message).map(Routed::Text)
                }
                TextKind::PreKeyBundle => cipher.decrypt_prekey_bundle(&message).map(Routed::Text),
                TextKind::KeyExchange => {
                    cipher.process_key_exchange(&message).map(Routed::Response)
                }
            }
        };

        let routed = routed.map_err(|e| {
            warn!(
                sender = %message.sender,
                kind = message.kind.as_str(),
                error = %e,
                "failed to process incoming SMS"
            );
            SmsSecureError::from(e)
        })?;

        match routed {
            Routed::Text(text) => {
                if text.end_session && text.body == END_SESSION_SIGNAL {
                    self.events.dispatch(SmsEvent::SessionTerminated {
                        sender: text.sender.clone(),
                    });
                }
                Ok(Received::Text(text))
            }
            Routed::Response(Some(response)) => {
                debug!(recipient = %response.recipient, "sending key exchange response");
                self.dispatcher.dispatch(response)?;
                Ok(Received::KeyExchange { responded: true })
            }
            Routed::Response(None) => Ok(Received::KeyExchange { responded: false }),
        }
    }
}
