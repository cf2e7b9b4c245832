use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use famcal_core::domain::conversation::HistoryTurn;

use crate::tools::ToolDefinition;

/// One forced tool call: the model must answer through `tool`.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub system: String,
    pub messages: Vec<HistoryTurn>,
    pub tool: ToolDefinition,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub input: Value,
}

/// Why a provider call failed, classified from the HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    Billing,
    RateLimit,
    NotFound,
    Timeout,
    Network,
    ServerError,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            402 => Self::Billing,
            404 => Self::NotFound,
            408 => Self::Timeout,
            429 => Self::RateLimit,
            500 | 502 | 503 | 504 | 529 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Billing => "billing",
            Self::RateLimit => "rate_limit",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed ({kind}): {message}")]
    Transport { kind: ProviderErrorKind, message: String },
    #[error("llm provider returned {status} ({kind}): {message}")]
    Status { status: u16, kind: ProviderErrorKind, message: String },
    #[error("llm response has no `{0}` tool call")]
    MissingToolCall(String),
    #[error("invalid llm response: {0}")]
    Decode(String),
}

impl LlmError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Transport { kind, .. } | Self::Status { kind, .. } => *kind,
            Self::MissingToolCall(_) | Self::Decode(_) => ProviderErrorKind::Unknown,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call_tool(&self, request: &ToolCallRequest) -> Result<ToolCall, LlmError>;
}

/// Replays queued tool calls in order and records every request.
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ToolCall, LlmError>>>,
    requests: Mutex<Vec<ToolCallRequest>>,
}

impl ScriptedLlmClient {
    pub async fn push_input(&self, input: Value) {
        let call = ToolCall { name: crate::tools::CALENDAR_INTENT_TOOL.to_string(), input };
        self.script.lock().await.push_back(Ok(call));
    }

    pub async fn push_error(&self, error: LlmError) {
        self.script.lock().await.push_back(Err(error));
    }

    pub async fn requests(&self) -> Vec<ToolCallRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn call_tool(&self, request: &ToolCallRequest) -> Result<ToolCall, LlmError> {
        self.requests.lock().await.push(request.clone());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::MissingToolCall(request.tool.name.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderErrorKind;

    #[test]
    fn statuses_classify_into_provider_kinds() {
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimit);
        assert_eq!(ProviderErrorKind::from_status(529), ProviderErrorKind::ServerError);
        assert_eq!(ProviderErrorKind::from_status(418), ProviderErrorKind::Unknown);
        assert_eq!(ProviderErrorKind::RateLimit.to_string(), "rate_limit");
    }
}
