use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use famcal_core::domain::conversation::{ConversationState, HistoryTurn, PendingAction, SenderId};

use super::{format_timestamp, parse_timestamp, ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_active(
        &self,
        sender: &SenderId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT sender_id, pending_state, pending_json, history_json, last_activity_at
             FROM conversations
             WHERE sender_id = ? AND last_activity_at > ?",
        )
        .bind(&sender.0)
        .bind(format_timestamp(now - ttl))
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn save(
        &self,
        state: &ConversationState,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let pending_json = state
            .pending
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("encode pending action: {error}")))?;
        let history_json = serde_json::to_string(&state.history)
            .map_err(|error| RepositoryError::Decode(format!("encode history: {error}")))?;

        sqlx::query(
            "INSERT INTO conversations (
                sender_id,
                pending_state,
                pending_json,
                history_json,
                last_activity_at
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(sender_id) DO UPDATE SET
                pending_state = excluded.pending_state,
                pending_json = excluded.pending_json,
                history_json = excluded.history_json,
                last_activity_at = excluded.last_activity_at",
        )
        .bind(&state.sender.0)
        .bind(state.pending.as_ref().map(PendingAction::marker))
        .bind(pending_json)
        .bind(history_json)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, sender: &SenderId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversations WHERE sender_id = ?")
            .bind(&sender.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversations WHERE last_activity_at <= ?")
            .bind(format_timestamp(now - ttl))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn conversation_from_row(row: SqliteRow) -> Result<ConversationState, RepositoryError> {
    let sender_id: String = row.try_get("sender_id")?;
    let pending_state: Option<String> = row.try_get("pending_state")?;
    let pending_json: Option<String> = row.try_get("pending_json")?;
    let history_json: String = row.try_get("history_json")?;
    let last_activity_at: String = row.try_get("last_activity_at")?;

    let pending = pending_json
        .map(|raw| {
            serde_json::from_str::<PendingAction>(&raw).map_err(|error| {
                RepositoryError::Decode(format!(
                    "invalid pending action for `{sender_id}`: {error}"
                ))
            })
        })
        .transpose()?;

    if pending.as_ref().map(PendingAction::marker) != pending_state.as_deref() {
        return Err(RepositoryError::Decode(format!(
            "pending marker `{}` does not match payload for `{sender_id}`",
            pending_state.unwrap_or_default()
        )));
    }

    let history = serde_json::from_str::<Vec<HistoryTurn>>(&history_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid history for `{sender_id}`: {error}"))
    })?;

    Ok(ConversationState {
        sender: SenderId(sender_id),
        pending,
        history,
        last_activity_at: parse_timestamp("last_activity_at", last_activity_at)?,
    })
}
