use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use famcal_core::config::LlmConfig;

use crate::llm::{LlmClient, LlmError, ProviderErrorKind, ToolCall, ToolCallRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client that forces a single tool call per request.
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

impl AnthropicClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            max_tokens,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Transport {
                kind: ProviderErrorKind::Unknown,
                message: format!("http client: {error}"),
            })?;

        Ok(Self::new(
            client,
            config.base_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
            config.max_tokens,
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &ToolCallRequest) -> Value {
        let messages = request
            .messages
            .iter()
            .map(|turn| json!({"role": turn.role.as_str(), "content": turn.content}))
            .collect::<Vec<_>>();

        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": [{
                "type": "text",
                "text": request.system,
                "cache_control": {"type": "ephemeral"}
            }],
            "tools": [request.tool],
            "tool_choice": {"type": "tool", "name": request.tool.name},
            "messages": messages,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn call_tool(&self, request: &ToolCallRequest) -> Result<ToolCall, LlmError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        debug!(
            event_name = "agent.llm.request",
            model = %self.model,
            message_count = request.messages.len(),
            "calling anthropic messages api"
        );

        let response = self
            .client
            .post(url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|error| LlmError::Transport {
                kind: if error.is_timeout() {
                    ProviderErrorKind::Timeout
                } else {
                    ProviderErrorKind::Network
                },
                message: error.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| LlmError::Transport {
            kind: ProviderErrorKind::Network,
            message: error.to_string(),
        })?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                kind: ProviderErrorKind::from_status(status.as_u16()),
                message: body.chars().take(200).collect(),
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|error| LlmError::Decode(error.to_string()))?;

        let usage = parsed.usage.unwrap_or_default();
        info!(
            event_name = "agent.llm.usage",
            model = %self.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cache_read_tokens = usage.cache_read_input_tokens,
            cache_creation_tokens = usage.cache_creation_input_tokens,
            "anthropic usage"
        );

        parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { name, input } if name == request.tool.name => {
                    Some(ToolCall { name, input })
                }
                _ => None,
            })
            .ok_or_else(|| LlmError::MissingToolCall(request.tool.name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use famcal_core::domain::conversation::HistoryTurn;

    use super::AnthropicClient;
    use crate::llm::ToolCallRequest;
    use crate::tools::calendar_intent_tool;

    #[test]
    fn request_forces_the_tool_and_caches_the_system_prompt() {
        let client = AnthropicClient::new(
            reqwest::Client::new(),
            "https://api.anthropic.com",
            SecretString::from("sk-test".to_string()),
            "claude-sonnet-4-20250514",
            1024,
        );
        let request = ToolCallRequest {
            system: "system prompt".to_string(),
            messages: vec![HistoryTurn::user("Hallo")],
            tool: calendar_intent_tool(),
        };

        let body = client.request_body(&request);

        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tool_choice"]["name"], "parse_calendar_intent");
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(body["tools"][0]["name"], "parse_calendar_intent");
        assert!(body["tools"][0]["input_schema"].is_object());
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
