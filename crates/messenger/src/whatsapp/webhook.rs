use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use famcal_db::IdempotencyRepository;

use super::payload::WebhookPayload;
use super::signature::{verify_signature, SIGNATURE_HEADER};
use crate::service::IngressEvent;

#[derive(Clone)]
pub struct WebhookState {
    app_secret: SecretString,
    verify_token: SecretString,
    processed: Arc<dyn IdempotencyRepository>,
    queue: mpsc::Sender<IngressEvent>,
}

impl WebhookState {
    pub fn new(
        app_secret: SecretString,
        verify_token: SecretString,
        processed: Arc<dyn IdempotencyRepository>,
        queue: mpsc::Sender<IngressEvent>,
    ) -> Self {
        Self { app_secret, verify_token, processed, queue }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook", get(verify).post(receive)).with_state(state)
}

/// Meta's subscription handshake: echo `hub.challenge` when mode and token match.
pub async fn verify(
    State(state): State<WebhookState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge");

    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge))
            if token == state.verify_token.expose_secret() =>
        {
            info!(event_name = "ingress.whatsapp.webhook_verified", "whatsapp webhook verified");
            (StatusCode::OK, challenge.clone())
        }
        _ => {
            warn!(
                event_name = "ingress.whatsapp.verification_failed",
                mode = mode.unwrap_or("missing"),
                "whatsapp webhook verification failed"
            );
            (StatusCode::FORBIDDEN, "Forbidden".to_string())
        }
    }
}

/// Validates the signature, acknowledges at once and processes the body in the background.
pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    if !verify_signature(state.app_secret.expose_secret().as_bytes(), &body, signature) {
        warn!(
            event_name = "ingress.whatsapp.signature_invalid",
            signature_present = signature.is_some(),
            "rejected whatsapp webhook with invalid signature"
        );
        return (StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    tokio::spawn(async move { enqueue_messages(&state, &body).await });
    (StatusCode::OK, "OK")
}

async fn enqueue_messages(state: &WebhookState, body: &[u8]) -> usize {
    let payload: WebhookPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "ingress.whatsapp.payload_invalid",
                error = %error,
                "could not parse whatsapp webhook payload"
            );
            return 0;
        }
    };

    let extracted = payload.extract(Utc::now());
    for skipped in &extracted.skipped {
        debug!(
            event_name = "ingress.whatsapp.non_text_skipped",
            correlation_id = %skipped,
            "skipped non-text whatsapp message"
        );
    }

    let mut queued = 0;
    for message in extracted.messages {
        match state.processed.is_processed(&message.message_id).await {
            Ok(true) => {
                debug!(
                    event_name = "ingress.whatsapp.duplicate",
                    correlation_id = %message.message_id,
                    "whatsapp message already processed"
                );
                continue;
            }
            Ok(false) => {}
            Err(error) => {
                // the worker checks again inside the runtime
                warn!(
                    event_name = "ingress.whatsapp.precheck_failed",
                    correlation_id = %message.message_id,
                    error = %error,
                    "idempotency pre-check failed"
                );
            }
        }

        info!(
            event_name = "ingress.whatsapp.message_received",
            correlation_id = %message.message_id,
            sender = %message.sender,
            "received whatsapp message"
        );
        let correlation_id = message.message_id.clone();
        if state.queue.send(IngressEvent::Text(message)).await.is_err() {
            warn!(
                event_name = "ingress.whatsapp.queue_closed",
                correlation_id = %correlation_id,
                "message queue closed; dropping whatsapp message"
            );
            break;
        }
        queued += 1;
    }
    queued
}
