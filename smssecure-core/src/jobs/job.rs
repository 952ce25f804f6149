//! The job abstraction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::requirement::{JobEnvironment, Requirement};
use super::{JobError, PushGroupSendJob, SmsSendJob};
use crate::config::SecureSmsConfig;
use crate::events::{EventDispatcher, SmsEvent};
use crate::protocol::SharedProtocol;
use crate::push::{PushSenderFactory, PushServiceConfig};
use crate::recipients::RecipientId;
use crate::sms::SmsTransport;
use crate::storage::{MessageId, SharedStorage};
use crate::transport::TransportCodec;

/// Scheduling parameters of a job.
#[derive(Debug, Clone, Default)]
pub struct JobParameters {
    /// Survives restarts.
    pub persistent: bool,
    /// Jobs sharing a group never run concurrently and run in order.
    pub group_id: Option<String>,
    pub requirements: Vec<Requirement>,
    /// Total number of runs before the job is given up.
    pub retry_count: u32,
}

impl JobParameters {
    pub fn builder() -> JobParametersBuilder {
        JobParametersBuilder {
            parameters: JobParameters {
                retry_count: 1,
                ..Default::default()
            },
        }
    }

    /// Returns true when every requirement holds.
    pub fn requirements_met(&self, env: &JobEnvironment) -> bool {
        self.requirements.iter().all(|r| r.is_met(env))
    }
}

/// Builder for [`JobParameters`].
pub struct JobParametersBuilder {
    parameters: JobParameters,
}

impl JobParametersBuilder {
    pub fn persistent(mut self) -> Self {
        self.parameters.persistent = true;
        self
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.parameters.group_id = Some(group_id.into());
        self
    }

    pub fn requirement(mut self, requirement: Requirement) -> Self {
        self.parameters.requirements.push(requirement);
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.parameters.retry_count = retry_count.max(1);
        self
    }

    pub fn build(self) -> JobParameters {
        self.parameters
    }
}

/// Process-wide collaborators handed to every job call.
///
/// The context is never persisted; restored jobs receive the live one.
#[derive(Clone)]
pub struct JobContext {
    pub storage: SharedStorage,
    pub protocol: SharedProtocol,
    pub push: Arc<dyn PushSenderFactory>,
    pub push_config: PushServiceConfig,
    pub sms: Arc<dyn SmsTransport>,
    pub events: Arc<EventDispatcher>,
    pub environment: Arc<JobEnvironment>,
    pub codec: TransportCodec,
}

impl JobContext {
    pub fn new(
        storage: SharedStorage,
        protocol: SharedProtocol,
        push: Arc<dyn PushSenderFactory>,
        push_config: PushServiceConfig,
        sms: Arc<dyn SmsTransport>,
        environment: Arc<JobEnvironment>,
    ) -> Self {
        JobContext {
            storage,
            protocol,
            push,
            push_config,
            sms,
            events: Arc::new(EventDispatcher::new()),
            environment,
            codec: TransportCodec::default(),
        }
    }

    /// Context whose push settings and codec come from `config`.
    pub fn from_config(
        config: &SecureSmsConfig,
        storage: SharedStorage,
        protocol: SharedProtocol,
        push: Arc<dyn PushSenderFactory>,
        sms: Arc<dyn SmsTransport>,
        environment: Arc<JobEnvironment>,
    ) -> Self {
        Self::new(storage, protocol, push, config.push.clone(), sms, environment)
            .with_codec(config.transport_codec())
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_codec(mut self, codec: TransportCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Fire-and-forget notification.
    pub fn notify(&self, event: SmsEvent) {
        self.events.dispatch(event);
    }
}

/// A unit of persisted, retryable work.
pub trait Job: Send {
    fn parameters(&self) -> JobParameters;

    /// Serializable description used to persist and restore the job.
    fn spec(&self) -> JobSpec;

    /// Runs once when the job is first enqueued.
    fn on_added(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }

    fn on_run(&mut self, ctx: &JobContext) -> Result<(), JobError>;

    /// Decides whether a failed run is attempted again.
    fn should_retry(&self, error: &JobError) -> bool {
        error.class().is_retryable()
    }

    /// Compensates after cancellation, retry exhaustion or a terminal error.
    fn on_canceled(&mut self, ctx: &JobContext);
}

/// Persisted form of the built-in jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSpec {
    PushGroupSend {
        message_id: MessageId,
        destination: String,
        #[serde(default)]
        filter_recipient: Option<RecipientId>,
    },
    SmsSend {
        message_id: MessageId,
        recipient: String,
    },
}

impl JobSpec {
    /// Rebuilds the job this spec describes.
    pub fn into_job(self) -> Box<dyn Job> {
        match self {
            JobSpec::PushGroupSend {
                message_id,
                destination,
                filter_recipient,
            } => Box::new(PushGroupSendJob::from_parts(
                message_id,
                destination,
                filter_recipient,
            )),
            JobSpec::SmsSend {
                message_id,
                recipient,
            } => Box::new(SmsSendJob::new(message_id, recipient)),
        }
    }

    pub fn to_json(&self) -> Result<String, JobError> {
        serde_json::to_string(self).map_err(|e| JobError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, JobError> {
        serde_json::from_str(json).map_err(|e| JobError::Serialization(e.to_string()))
    }
}
