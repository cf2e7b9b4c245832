use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use famcal_agent::replies;
use famcal_agent::{AgentRuntime, MessageOutcome};
use famcal_core::domain::conversation::SenderId;
use famcal_core::messaging::{InboundMessage, MessageSender, Recipient};

use crate::gate::{AccessGate, GateDecision};

/// A message accepted from a transport, before the family gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngressEvent {
    Text(InboundMessage),
    /// Attachment, sticker or anything else without a text body.
    NonText { sender: SenderId, reply_to: Recipient, received_at: DateTime<Utc> },
}

impl IngressEvent {
    pub fn sender(&self) -> &SenderId {
        match self {
            Self::Text(message) => &message.sender,
            Self::NonText { sender, .. } => sender,
        }
    }

    pub fn reply_to(&self) -> &Recipient {
        match self {
            Self::Text(message) => &message.reply_to,
            Self::NonText { reply_to, .. } => reply_to,
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        match self {
            Self::Text(message) => message.received_at,
            Self::NonText { received_at, .. } => *received_at,
        }
    }

    fn correlation_id(&self) -> &str {
        match self {
            Self::Text(message) => &message.message_id.0,
            Self::NonText { .. } => "non-text",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressOutcome {
    Rejected,
    Dropped,
    NonTextAnswered,
    Duplicate,
    Replied,
    Failed,
}

/// Shared entry point of every transport: gate, agent, and the apology on failure.
pub struct InboundMessageService {
    gate: AccessGate,
    runtime: Arc<AgentRuntime>,
    sender: Arc<dyn MessageSender>,
}

impl InboundMessageService {
    pub fn new(
        gate: AccessGate,
        runtime: Arc<AgentRuntime>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self { gate, runtime, sender }
    }

    pub async fn handle(&self, event: IngressEvent) -> IngressOutcome {
        let correlation_id = event.correlation_id().to_owned();
        let sender = event.sender().clone();

        match self.gate.check(&sender, event.received_at()).await {
            GateDecision::Allowed => {}
            GateDecision::Rejected => {
                info!(
                    event_name = "ingress.sender_rejected",
                    correlation_id = %correlation_id,
                    sender = %sender,
                    "rejected message from unknown sender"
                );
                self.notify(event.reply_to(), replies::UNKNOWN_SENDER, &correlation_id).await;
                return IngressOutcome::Rejected;
            }
            GateDecision::Silenced => {
                debug!(
                    event_name = "ingress.sender_silenced",
                    correlation_id = %correlation_id,
                    sender = %sender,
                    "dropped message from unknown sender inside notice cooldown"
                );
                return IngressOutcome::Dropped;
            }
        }

        let message = match event {
            IngressEvent::Text(message) => message,
            IngressEvent::NonText { reply_to, .. } => {
                self.notify(&reply_to, replies::NON_TEXT, &correlation_id).await;
                return IngressOutcome::NonTextAnswered;
            }
        };

        match self.runtime.handle_message(&message).await {
            Ok(MessageOutcome::Duplicate) => IngressOutcome::Duplicate,
            Ok(MessageOutcome::Replied(_)) => IngressOutcome::Replied,
            Err(error) => {
                error!(
                    event_name = "ingress.message_failed",
                    correlation_id = %correlation_id,
                    sender = %sender,
                    error_class = error.error_class(),
                    error = %error,
                    "message handling failed"
                );
                self.notify(&message.reply_to, replies::APOLOGY, &correlation_id).await;
                IngressOutcome::Failed
            }
        }
    }

    async fn notify(&self, recipient: &Recipient, text: &str, correlation_id: &str) {
        if let Err(error) = self.sender.send(recipient, text).await {
            warn!(
                event_name = "ingress.notice_send_failed",
                correlation_id = %correlation_id,
                recipient = %recipient,
                error = %error,
                "failed to send notice"
            );
        }
    }
}
