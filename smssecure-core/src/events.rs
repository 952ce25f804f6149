//! Event System
//!
//! Notifications raised by the delivery jobs and the cipher layer.

use std::sync::Arc;

use crate::storage::MessageId;

/// Events emitted by the secure transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsEvent {
    /// A message reached `SentFailed`.
    DeliveryFailed {
        /// The message that failed.
        message_id: MessageId,
        /// Destination number or group id.
        destination: String,
    },

    /// A message was delivered to every recipient.
    MessageSent {
        /// The message ID.
        message_id: MessageId,
    },

    /// A handshake message was sent to a recipient.
    KeyExchangeSent {
        /// The recipient number.
        recipient: String,
    },

    /// A peer tore down our session with them.
    SessionTerminated {
        /// The peer number.
        sender: String,
    },
}

/// Event handler trait.
///
/// Implement this trait to receive transport events.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: SmsEvent);
}

/// Simple callback-based event handler.
///
/// Wraps a closure for easy event handling.
pub struct CallbackHandler<F>
where
    F: Fn(SmsEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(SmsEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(SmsEvent) + Send + Sync,
{
    fn on_event(&self, event: SmsEvent) {
        (self.callback)(event);
    }
}

/// Event dispatcher for managing multiple handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    pub fn new() -> Self {
        EventDispatcher {
            handlers: Vec::new(),
        }
    }

    /// Adds an event handler.
    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatches an event to all handlers.
    pub fn dispatch(&self, event: SmsEvent) {
        for handler in &self.handlers {
            handler.on_event(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_reaches_every_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            dispatcher.add_handler(Arc::new(CallbackHandler::new(move |event| {
                seen.lock().unwrap().push(event);
            })));
        }

        dispatcher.dispatch(SmsEvent::MessageSent {
            message_id: MessageId(4),
        });

        assert_eq!(dispatcher.handler_count(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
