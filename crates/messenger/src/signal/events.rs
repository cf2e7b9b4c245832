use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use famcal_core::domain::conversation::SenderId;
use famcal_core::messaging::{InboundMessage, MessageId, Recipient};

use crate::service::IngressEvent;

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("invalid json-rpc line: {0}")]
    Json(String),
    #[error("receive notification without envelope")]
    MissingEnvelope,
}

/// One line from the daemon, classified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalEvent {
    Ingress(IngressEvent),
    Ignored(&'static str),
}

#[derive(Debug, Deserialize)]
struct RpcLine {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<ReceiveParams>,
}

#[derive(Debug, Deserialize)]
struct ReceiveParams {
    #[serde(default)]
    envelope: Option<SignalEnvelope>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_number: Option<String>,
    #[serde(default)]
    pub source_uuid: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub data_message: Option<DataMessage>,
    #[serde(default)]
    pub sync_message: Option<Value>,
    #[serde(default)]
    pub receipt_message: Option<Value>,
    #[serde(default)]
    pub typing_message: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub group_info: Option<GroupInfo>,
    #[serde(default)]
    pub attachments: Vec<Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_id: String,
}

/// Parses one newline-delimited JSON-RPC line from `signal-cli`.
pub fn parse_line(line: &str, received_at: DateTime<Utc>) -> Result<SignalEvent, EventParseError> {
    let parsed: RpcLine =
        serde_json::from_str(line).map_err(|error| EventParseError::Json(error.to_string()))?;

    match parsed.method.as_deref() {
        Some("receive") => {}
        Some(_) => return Ok(SignalEvent::Ignored("other_notification")),
        None => return Ok(SignalEvent::Ignored("rpc_response")),
    }

    let envelope =
        parsed.params.and_then(|params| params.envelope).ok_or(EventParseError::MissingEnvelope)?;
    Ok(envelope.into_event(received_at))
}

impl SignalEnvelope {
    /// Number first, then the legacy `source` field, then the account UUID.
    pub fn sender(&self) -> Option<SenderId> {
        [&self.source_number, &self.source, &self.source_uuid]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(|value| SenderId(value.to_owned()))
    }

    pub fn into_event(self, received_at: DateTime<Utc>) -> SignalEvent {
        if self.sync_message.is_some() {
            return SignalEvent::Ignored("sync_message");
        }
        if self.receipt_message.is_some() {
            return SignalEvent::Ignored("receipt_message");
        }
        if self.typing_message.is_some() {
            return SignalEvent::Ignored("typing_message");
        }
        let Some(sender) = self.sender() else {
            return SignalEvent::Ignored("missing_sender");
        };
        let Some(data) = self.data_message else {
            return SignalEvent::Ignored("no_data_message");
        };

        let reply_to = match data.group_info {
            Some(group) => Recipient::Group(group.group_id),
            None => Recipient::Direct(sender.clone()),
        };

        let text = data.message.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            if data.attachments.is_empty() {
                return SignalEvent::Ignored("empty_message");
            }
            return SignalEvent::Ingress(IngressEvent::NonText { sender, reply_to, received_at });
        }

        let timestamp = data.timestamp.unwrap_or(self.timestamp);
        let message_id = MessageId(format!("{}:{timestamp}", sender.0));
        SignalEvent::Ingress(IngressEvent::Text(InboundMessage {
            sender,
            reply_to,
            message_id,
            text: text.to_owned(),
            received_at,
        }))
    }
}
