#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Europe::Berlin;
use serde_json::json;

use famcal_agent::llm::ScriptedLlmClient;
use famcal_agent::{AgentRuntime, AgentSettings};
use famcal_core::calendar::InMemoryCalendar;
use famcal_core::domain::family::FamilyWhitelist;
use famcal_core::messaging::{MessageId, RecordingSender};
use famcal_db::{
    IdempotencyRepository, InMemoryConversationRepository, InMemoryIdempotencyRepository,
    RepositoryError,
};
use famcal_messenger::{AccessGate, InboundMessageService};

pub const ANNA: &str = "+4915100000001";
pub const STRANGER: &str = "+4917000000009";

pub struct Stack {
    pub llm: Arc<ScriptedLlmClient>,
    pub sender: Arc<RecordingSender>,
    pub processed: Arc<dyn IdempotencyRepository>,
    pub service: Arc<InboundMessageService>,
}

pub fn stack() -> Stack {
    stack_with(Arc::new(InMemoryIdempotencyRepository::default()))
}

pub fn stack_with(processed: Arc<dyn IdempotencyRepository>) -> Stack {
    let llm = Arc::new(ScriptedLlmClient::default());
    let sender = Arc::new(RecordingSender::default());
    let whitelist = Arc::new(
        FamilyWhitelist::from_toml_str(&format!(
            "[[members]]\nphone = \"{ANNA}\"\nname = \"Anna\"\n"
        ))
        .expect("whitelist"),
    );

    let runtime = AgentRuntime::new(
        llm.clone(),
        Arc::new(InMemoryCalendar::new(Berlin)),
        Arc::new(InMemoryConversationRepository::default()),
        processed.clone(),
        sender.clone(),
        whitelist.clone(),
        AgentSettings::default(),
    );
    let gate = AccessGate::new(whitelist, Duration::minutes(5));
    let service = Arc::new(InboundMessageService::new(gate, Arc::new(runtime), sender.clone()));

    Stack { llm, sender, processed, service }
}

pub async fn script_greeting(llm: &ScriptedLlmClient) {
    llm.push_input(json!({"intent": "greeting", "entities": {}, "confidence": 1.0})).await;
}

/// Idempotency store whose database is gone.
pub struct BrokenIdempotency;

#[async_trait]
impl IdempotencyRepository for BrokenIdempotency {
    async fn is_processed(&self, _message_id: &MessageId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Decode("database unavailable".to_string()))
    }

    async fn mark_processed(
        &self,
        _message_id: &MessageId,
        _now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Decode("database unavailable".to_string()))
    }

    async fn cleanup(
        &self,
        _now: DateTime<Utc>,
        _retention: Duration,
    ) -> Result<u64, RepositoryError> {
        Ok(0)
    }
}
