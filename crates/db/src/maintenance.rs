use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use famcal_core::config::ConversationConfig;

use crate::repositories::{ConversationRepository, IdempotencyRepository, RepositoryError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub session_ttl: Duration,
    pub processed_retention: Duration,
}

impl RetentionPolicy {
    pub fn from_config(config: &ConversationConfig) -> Self {
        Self {
            session_ttl: Duration::minutes(config.session_ttl_minutes as i64),
            processed_retention: Duration::days(config.processed_retention_days as i64),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub conversations_purged: u64,
    pub processed_messages_purged: u64,
}

/// Deletes idle conversations and idempotency records past their retention.
pub async fn purge_expired(
    conversations: &dyn ConversationRepository,
    processed: &dyn IdempotencyRepository,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<CleanupReport, RepositoryError> {
    let conversations_purged = conversations.purge_expired(now, policy.session_ttl).await?;
    let processed_messages_purged = processed.cleanup(now, policy.processed_retention).await?;
    Ok(CleanupReport { conversations_purged, processed_messages_purged })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use famcal_core::domain::conversation::{HistoryTurn, SenderId};
    use famcal_core::messaging::MessageId;

    use super::{purge_expired, CleanupReport, RetentionPolicy};
    use crate::repositories::{ConversationRepository, IdempotencyRepository};
    use crate::{InMemoryConversationRepository, InMemoryIdempotencyRepository};

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid timestamp").with_timezone(&Utc)
    }

    #[tokio::test]
    async fn purges_idle_conversations_and_old_message_ids() {
        let conversations = InMemoryConversationRepository::default();
        let processed = InMemoryIdempotencyRepository::default();
        let policy = RetentionPolicy {
            session_ttl: Duration::minutes(30),
            processed_retention: Duration::days(7),
        };

        conversations
            .append_history(
                &SenderId("+4915100000001".to_string()),
                HistoryTurn::user("Hallo"),
                5,
                parse_ts("2026-03-01T08:00:00Z"),
                policy.session_ttl,
            )
            .await
            .expect("append");
        conversations
            .append_history(
                &SenderId("+4915100000002".to_string()),
                HistoryTurn::user("Hallo"),
                5,
                parse_ts("2026-03-09T09:50:00Z"),
                policy.session_ttl,
            )
            .await
            .expect("append");
        processed
            .mark_processed(&MessageId("old".to_string()), parse_ts("2026-03-01T08:00:00Z"))
            .await
            .expect("mark");
        processed
            .mark_processed(&MessageId("new".to_string()), parse_ts("2026-03-09T08:00:00Z"))
            .await
            .expect("mark");

        let report =
            purge_expired(&conversations, &processed, policy, parse_ts("2026-03-09T10:00:00Z"))
                .await
                .expect("purge");

        assert_eq!(report, CleanupReport { conversations_purged: 1, processed_messages_purged: 1 });
        assert!(processed.is_processed(&MessageId("new".to_string())).await.expect("lookup"));
        assert_eq!(conversations.len().await, 1);
    }
}
