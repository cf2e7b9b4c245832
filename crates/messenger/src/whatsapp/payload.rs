use chrono::{DateTime, Utc};
use serde::Deserialize;

use famcal_core::domain::conversation::SenderId;
use famcal_core::messaging::{InboundMessage, MessageId};

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: String,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WhatsAppMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

/// Result of flattening one webhook delivery.
#[derive(Debug, Default)]
pub struct Extracted {
    pub messages: Vec<InboundMessage>,
    /// Ids of non-text messages, which are logged and skipped.
    pub skipped: Vec<String>,
}

impl WebhookPayload {
    /// Text messages from `entry[].changes[].value.messages[]`; status updates carry none.
    pub fn extract(self, received_at: DateTime<Utc>) -> Extracted {
        let mut extracted = Extracted::default();

        let messages = self
            .entry
            .into_iter()
            .flat_map(|entry| entry.changes)
            .flat_map(|change| change.value.messages);

        for message in messages {
            let body = match (message.kind.as_str(), message.text) {
                ("text", Some(text)) if !text.body.trim().is_empty() => text.body,
                _ => {
                    extracted.skipped.push(message.id);
                    continue;
                }
            };
            if message.id.is_empty() || message.from.is_empty() {
                continue;
            }

            extracted.messages.push(InboundMessage::direct(
                SenderId(to_e164(&message.from)),
                MessageId(message.id),
                body.trim(),
                received_at,
            ));
        }

        extracted
    }
}

/// WhatsApp ids are bare digits; the whitelist stores `+` prefixed numbers.
pub fn to_e164(wa_id: &str) -> String {
    let digits = wa_id.trim();
    if digits.starts_with('+') {
        digits.to_owned()
    } else {
        format!("+{digits}")
    }
}
