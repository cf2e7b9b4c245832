use chrono::{DateTime, Duration, Utc};

use famcal_core::messaging::MessageId;

use super::{format_timestamp, IdempotencyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIdempotencyRepository {
    pool: DbPool,
}

impl SqlIdempotencyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IdempotencyRepository for SqlIdempotencyRepository {
    async fn is_processed(&self, message_id: &MessageId) -> Result<bool, RepositoryError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM processed_messages WHERE message_id = ?")
                .bind(&message_id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn mark_processed(
        &self,
        message_id: &MessageId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO processed_messages (message_id, processed_at)
             VALUES (?, ?)
             ON CONFLICT(message_id) DO NOTHING",
        )
        .bind(&message_id.0)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cleanup(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM processed_messages WHERE processed_at < ?")
            .bind(format_timestamp(now - retention))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
