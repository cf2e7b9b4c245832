use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use famcal_core::config::SignalConfig;
use famcal_core::messaging::{MessageSender, Recipient, SendError};

use super::rpc::{RpcError, SignalRpcClient};

/// Sends replies through the daemon's `send` method, spaced by `send_interval`.
pub struct SignalSender {
    rpc: SignalRpcClient,
    account: Option<String>,
    send_interval: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl SignalSender {
    pub fn new(rpc: SignalRpcClient, account: Option<String>, send_interval: Duration) -> Self {
        Self { rpc, account, send_interval, last_send: Mutex::new(None) }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        let account = Some(config.account.trim().to_owned()).filter(|account| !account.is_empty());
        Self::new(
            SignalRpcClient::new(config.rpc_address.clone()),
            account,
            Duration::from_millis(config.send_interval_ms),
        )
    }

    fn params(&self, recipient: &Recipient, text: &str) -> Value {
        let mut params = match recipient {
            Recipient::Direct(sender) => json!({"recipient": [sender.0], "message": text}),
            Recipient::Group(group_id) => json!({"groupId": group_id, "message": text}),
        };
        if let Some(account) = &self.account {
            params["account"] = json!(account);
        }
        params
    }

    async fn wait_for_slot(&self) {
        let mut last_send = self.last_send.lock().await;
        if let Some(previous) = *last_send {
            let ready_at = previous + self.send_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_send = Some(Instant::now());
    }
}

#[async_trait]
impl MessageSender for SignalSender {
    async fn send(&self, recipient: &Recipient, text: &str) -> Result<(), SendError> {
        self.wait_for_slot().await;
        self.rpc.request("send", self.params(recipient, text)).await.map_err(|error| match error {
            RpcError::Remote { .. } => SendError::Rejected(error.to_string()),
            _ => SendError::Unavailable(error.to_string()),
        })?;

        debug!(
            event_name = "egress.signal.message_sent",
            recipient = %recipient,
            "sent signal message"
        );
        Ok(())
    }
}
