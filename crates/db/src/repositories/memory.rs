use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use famcal_core::domain::conversation::{ConversationState, SenderId};
use famcal_core::messaging::MessageId;

use super::{ConversationRepository, IdempotencyRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    states: RwLock<HashMap<SenderId, ConversationState>>,
}

impl InMemoryConversationRepository {
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_active(
        &self,
        sender: &SenderId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let states = self.states.read().await;
        Ok(states.get(sender).filter(|state| !state.is_expired(now, ttl)).cloned())
    }

    async fn save(
        &self,
        state: &ConversationState,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut stored = state.clone();
        stored.last_activity_at = now;
        self.states.write().await.insert(stored.sender.clone(), stored);
        Ok(())
    }

    async fn clear(&self, sender: &SenderId) -> Result<(), RepositoryError> {
        self.states.write().await.remove(sender);
        Ok(())
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<u64, RepositoryError> {
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, state| !state.is_expired(now, ttl));
        Ok((before - states.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryIdempotencyRepository {
    processed: RwLock<HashMap<MessageId, DateTime<Utc>>>,
}

#[async_trait::async_trait]
impl IdempotencyRepository for InMemoryIdempotencyRepository {
    async fn is_processed(&self, message_id: &MessageId) -> Result<bool, RepositoryError> {
        Ok(self.processed.read().await.contains_key(message_id))
    }

    async fn mark_processed(
        &self,
        message_id: &MessageId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut processed = self.processed.write().await;
        if processed.contains_key(message_id) {
            return Ok(false);
        }
        processed.insert(message_id.clone(), now);
        Ok(true)
    }

    async fn cleanup(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<u64, RepositoryError> {
        let cutoff = now - retention;
        let mut processed = self.processed.write().await;
        let before = processed.len();
        processed.retain(|_, processed_at| *processed_at >= cutoff);
        Ok((before - processed.len()) as u64)
    }
}
