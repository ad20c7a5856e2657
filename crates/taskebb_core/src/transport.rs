use crate::error::AppError;
use crate::model::SubscriberId;
use async_trait::async_trait;
use std::time::Duration;

/// A text message received from a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub subscriber: SubscriberId,
    pub text: String,
}

impl InboundMessage {
    pub fn new<S: Into<String>>(subscriber: SubscriberId, text: S) -> Self {
        Self {
            subscriber,
            text: text.into(),
        }
    }
}

/// Result of one long poll. `next_offset` is the offset to request next,
/// already past every update the transport saw, including skipped ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollBatch {
    pub messages: Vec<InboundMessage>,
    pub next_offset: i64,
}

#[async_trait]
pub trait InboundTransport: Send + Sync {
    async fn poll(&self, offset: i64, timeout: Duration) -> Result<PollBatch, AppError>;
}
