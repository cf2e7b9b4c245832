use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use famcal_db::{purge_expired, ConversationRepository, IdempotencyRepository, RetentionPolicy};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Purges expired conversations and idempotency records every `interval`.
pub fn spawn_periodic_cleanup(
    conversations: Arc<dyn ConversationRepository>,
    processed: Arc<dyn IdempotencyRepository>,
    policy: RetentionPolicy,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately and bootstrap already purged
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match purge_expired(conversations.as_ref(), processed.as_ref(), policy, Utc::now())
                .await
            {
                Ok(report) => info!(
                    event_name = "system.cleanup.completed",
                    conversations_purged = report.conversations_purged,
                    processed_messages_purged = report.processed_messages_purged,
                    "periodic cleanup completed"
                ),
                Err(error) => warn!(
                    event_name = "system.cleanup.failed",
                    error = %error,
                    "periodic cleanup failed; retrying next interval"
                ),
            }
        }
    })
}
