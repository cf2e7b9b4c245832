use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use thiserror::Error;

use famcal_core::domain::conversation::{ConversationState, HistoryTurn, SenderId};
use famcal_core::messaging::MessageId;

pub mod conversation;
pub mod idempotency;
pub mod memory;

pub use conversation::SqlConversationRepository;
pub use idempotency::SqlIdempotencyRepository;
pub use memory::{InMemoryConversationRepository, InMemoryIdempotencyRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// State of `sender`, or `None` when missing or idle for longer than `ttl`.
    async fn find_active(
        &self,
        sender: &SenderId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<ConversationState>, RepositoryError>;

    /// Upserts `state` with its last activity refreshed to `now`.
    async fn save(&self, state: &ConversationState, now: DateTime<Utc>)
        -> Result<(), RepositoryError>;

    async fn clear(&self, sender: &SenderId) -> Result<(), RepositoryError>;

    /// Physically removes states idle for longer than `ttl`.
    async fn purge_expired(&self, now: DateTime<Utc>, ttl: Duration)
        -> Result<u64, RepositoryError>;

    /// Appends one turn to the active state (or a fresh one) and keeps the
    /// last `limit` turns.
    async fn append_history(
        &self,
        sender: &SenderId,
        turn: HistoryTurn,
        limit: usize,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<ConversationState, RepositoryError> {
        let mut state = self
            .find_active(sender, now, ttl)
            .await?
            .unwrap_or_else(|| ConversationState::new(sender.clone(), now));
        state.push_turn(turn, limit);
        self.save(&state, now).await?;
        state.last_activity_at = now;
        Ok(state)
    }
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn is_processed(&self, message_id: &MessageId) -> Result<bool, RepositoryError>;

    /// Inserts the id if absent. Returns `false` when it was already recorded.
    async fn mark_processed(
        &self,
        message_id: &MessageId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Deletes records older than `retention`; returns the number removed.
    async fn cleanup(&self, now: DateTime<Utc>, retention: Duration)
        -> Result<u64, RepositoryError>;
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
