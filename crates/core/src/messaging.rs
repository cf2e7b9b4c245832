//! Transport-neutral message seams between chat adapters and the agent.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::conversation::SenderId;

/// Transport-assigned id; the idempotency key of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Direct(SenderId),
    Group(String),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(sender) => write!(f, "direct:{sender}"),
            Self::Group(group_id) => write!(f, "group:{group_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: SenderId,
    pub reply_to: Recipient,
    pub message_id: MessageId,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn direct(
        sender: SenderId,
        message_id: MessageId,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reply_to: Recipient::Direct(sender.clone()),
            sender,
            message_id,
            text: text.into(),
            received_at,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message transport unavailable: {0}")]
    Unavailable(String),
    #[error("message rejected by transport: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: &Recipient, text: &str) -> Result<(), SendError>;
}

/// Records outgoing messages instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: tokio::sync::Mutex<Vec<(Recipient, String)>>,
}

impl RecordingSender {
    pub async fn sent(&self) -> Vec<(Recipient, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, text)| text.clone()).collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, recipient: &Recipient, text: &str) -> Result<(), SendError> {
        self.sent.lock().await.push((recipient.clone(), text.to_owned()));
        Ok(())
    }
}
