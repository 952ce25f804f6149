//! Carrier transport boundary.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::OutgoingTextMessage;

/// Errors from the SMS carrier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmsError {
    /// The radio or carrier is temporarily unavailable.
    #[error("SMS service unavailable: {0}")]
    Unavailable(String),

    /// The carrier rejected the message.
    #[error("SMS rejected: {0}")]
    Rejected(String),
}

impl SmsError {
    /// Returns true if sending again later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SmsError::Unavailable(_))
    }
}

/// Hands finished SMS bodies to the carrier.
pub trait SmsTransport: Send + Sync {
    fn send_text(&self, message: &OutgoingTextMessage) -> Result<(), SmsError>;
}

/// Recording transport for tests.
#[derive(Clone, Default)]
pub struct MockSmsTransport {
    sent: Arc<Mutex<Vec<OutgoingTextMessage>>>,
    failures: Arc<Mutex<Vec<SmsError>>>,
}

impl MockSmsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error returned by the next send.
    pub fn fail_next(&self, error: SmsError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(error);
        }
    }

    /// Returns every message sent so far.
    pub fn sent(&self) -> Vec<OutgoingTextMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

impl SmsTransport for MockSmsTransport {
    fn send_text(&self, message: &OutgoingTextMessage) -> Result<(), SmsError> {
        if let Ok(mut failures) = self.failures.lock() {
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
