use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use famcal_core::config::WhatsAppConfig;
use famcal_core::messaging::{MessageSender, Recipient, SendError};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Replies through the Graph API `/{phone_number_id}/messages` endpoint.
pub struct WhatsAppSender {
    client: Client,
    base_url: String,
    phone_number_id: String,
    access_token: SecretString,
}

impl WhatsAppSender {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: SecretString,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            phone_number_id: phone_number_id.into(),
            access_token,
        }
    }

    pub fn from_config(config: &WhatsAppConfig) -> Result<Self, SendError> {
        let phone_number_id = config.phone_number_id.clone().ok_or_else(|| {
            SendError::Unavailable("whatsapp.phone_number_id is not configured".to_string())
        })?;
        let access_token = config.access_token.clone().ok_or_else(|| {
            SendError::Unavailable("whatsapp.access_token is not configured".to_string())
        })?;
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|error| SendError::Unavailable(format!("http client: {error}")))?;

        Ok(Self::new(client, config.api_base_url.clone(), phone_number_id, access_token))
    }

    fn body(to: &str, text: &str) -> Value {
        json!({
            "messaging_product": "whatsapp",
            "to": to.trim_start_matches('+'),
            "type": "text",
            "text": {"body": text}
        })
    }
}

#[async_trait]
impl MessageSender for WhatsAppSender {
    async fn send(&self, recipient: &Recipient, text: &str) -> Result<(), SendError> {
        let Recipient::Direct(to) = recipient else {
            return Err(SendError::Rejected("whatsapp replies go to single numbers".to_string()));
        };
        let url = format!(
            "{}/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.phone_number_id
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&Self::body(&to.0, text))
            .send()
            .await
            .map_err(|error| SendError::Unavailable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("status {}: {}", status.as_u16(), truncate(&body));
            return Err(if status.is_client_error() {
                SendError::Rejected(detail)
            } else {
                SendError::Unavailable(detail)
            });
        }

        debug!(
            event_name = "egress.whatsapp.message_sent",
            recipient = %recipient,
            "sent whatsapp message"
        );
        Ok(())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
