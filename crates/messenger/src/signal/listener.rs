use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::{parse_line, SignalEvent};
use crate::pool::IngressPool;
use crate::service::{InboundMessageService, IngressEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// Exponential backoff between reconnects. `max_retries` counts consecutive failures;
/// a connection that delivered a line resets the count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 20, base_delay_ms: 500, max_delay_ms: 60_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SignalTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next newline-delimited JSON-RPC line; `None` when the daemon closed the stream.
    async fn next_line(&self) -> Result<Option<String>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct SignalListener {
    transport: Arc<dyn SignalTransport>,
    service: Arc<InboundMessageService>,
    reconnect_policy: ReconnectPolicy,
    max_concurrent: usize,
}

/// Why a connection ended, and how many lines it delivered first.
struct Disconnected {
    error: TransportError,
    received: usize,
}

impl SignalListener {
    pub fn new(
        transport: Arc<dyn SignalTransport>,
        service: Arc<InboundMessageService>,
        reconnect_policy: ReconnectPolicy,
        max_concurrent: usize,
    ) -> Self {
        Self { transport, service, reconnect_policy, max_concurrent }
    }

    /// Pumps messages until reconnects are exhausted. A closed stream counts as a failed
    /// connection; transport failures never propagate to the caller.
    pub async fn run(&self) {
        let mut pool = IngressPool::new(self.service.clone(), self.max_concurrent);
        let mut failures = 0_u32;

        loop {
            let Disconnected { error, received } =
                self.connect_and_pump(&mut pool, failures).await;
            if received > 0 {
                failures = 0;
            }
            warn!(
                event_name = "ingress.signal.transport_failed",
                attempt = failures,
                max_retries = self.reconnect_policy.max_retries,
                error = %error,
                "signal transport failed"
            );

            if failures >= self.reconnect_policy.max_retries {
                warn!(
                    event_name = "ingress.signal.retries_exhausted",
                    max_retries = self.reconnect_policy.max_retries,
                    "signal retries exhausted; continuing process without crash"
                );
                break;
            }

            let delay = self.reconnect_policy.backoff(failures);
            failures += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        pool.drain().await;
    }

    async fn connect_and_pump(&self, pool: &mut IngressPool, attempt: u32) -> Disconnected {
        info!(event_name = "ingress.signal.connecting", attempt, "opening signal-cli connection");
        if let Err(error) = self.transport.connect().await {
            return Disconnected { error, received: 0 };
        }
        info!(event_name = "ingress.signal.connected", attempt, "signal-cli connected");

        let mut received = 0_usize;
        loop {
            let error = match self.transport.next_line().await {
                Ok(Some(line)) => {
                    received += 1;
                    if let Some(event) = self.classify(&line) {
                        pool.submit(event).await;
                    }
                    continue;
                }
                Ok(None) => TransportError::Receive("stream closed by daemon".to_string()),
                Err(error) => error,
            };

            if let Err(disconnect_error) = self.transport.disconnect().await {
                debug!(error = %disconnect_error, "signal-cli disconnect failed");
            }
            return Disconnected { error, received };
        }
    }

    fn classify(&self, line: &str) -> Option<IngressEvent> {
        if line.trim().is_empty() {
            return None;
        }
        match parse_line(line, Utc::now()) {
            Ok(SignalEvent::Ingress(event)) => {
                info!(
                    event_name = "ingress.signal.message_received",
                    sender = %event.sender(),
                    reply_to = %event.reply_to(),
                    "received signal message"
                );
                Some(event)
            }
            Ok(SignalEvent::Ignored(reason)) => {
                debug!(event_name = "ingress.signal.envelope_ignored", reason, "ignored line");
                None
            }
            Err(error) => {
                warn!(
                    event_name = "ingress.signal.parse_failed",
                    error = %error,
                    "could not parse signal-cli line; continuing"
                );
                None
            }
        }
    }
}
