//! SMSSecure Core Library
//!
//! Secure transport layer for encrypted SMS and push group delivery:
//! the SMS-safe body codec, the session cipher, the key exchange
//! initiator and the job system that delivers outgoing messages.

pub mod cipher;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod jobs;
pub mod protocol;
pub mod push;
pub mod receiver;
pub mod recipients;
pub mod sender;
pub mod sms;
pub mod storage;
pub mod transport;

pub use cipher::{
    CipherError, ConfirmationPrompt, InitiateOutcome, KeyExchangeInitiator, SmsCipher,
    SmsDispatcher, END_SESSION_SIGNAL,
};
pub use config::{ConfigError, JobConfig, SecureSmsConfig};
pub use crypto::{decrypt, encrypt, SymmetricKey};
pub use error::{ErrorClass, SmsSecureError};
pub use events::{CallbackHandler, EventDispatcher, EventHandler, SmsEvent};
pub use jobs::{
    Job, JobContext, JobEnvironment, JobError, JobManager, JobParameters, JobWorkers,
    PushGroupSendJob, Requirement, RequirementKind, SmsSendJob,
};
pub use protocol::{
    Address, CiphertextKind, CiphertextMessage, IdentityKey, IdentityKeyPair, ProtocolError,
    SessionEngine, SessionProtocol, SharedProtocol,
};
pub use push::{
    GroupContext, GroupType, PushError, PushMessage, PushSender, PushSenderFactory,
    PushServiceConfig, SendResult,
};
pub use receiver::{MessageReceiver, Received};
pub use recipients::{canonicalize_number, RecipientError, RecipientId};
pub use sender::MessageSender;
pub use sms::{IncomingTextMessage, OutgoingTextMessage, SmsError, SmsTransport, TextKind};
pub use storage::{MessageId, MessageStatus, SharedStorage, Storage, StorageError};
pub use transport::{CodecConfig, TransportCodec, TransportError};
