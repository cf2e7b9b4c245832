use chrono::Utc;
use famcal_db::{
    purge_expired, RetentionPolicy, SqlConversationRepository, SqlIdempotencyRepository,
};

use crate::commands::{connect_and_migrate, current_thread_runtime, load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("cleanup") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match current_thread_runtime("cleanup") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let policy = RetentionPolicy::from_config(&config.conversation);
    let result = runtime.block_on(async {
        let pool = connect_and_migrate(&config).await?;
        let conversations = SqlConversationRepository::new(pool.clone());
        let processed = SqlIdempotencyRepository::new(pool.clone());
        let report = purge_expired(&conversations, &processed, policy, Utc::now())
            .await
            .map_err(|error| ("cleanup", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, super::StepError>(report)
    });

    match result {
        Ok(report) => CommandResult::success(
            "cleanup",
            format!(
                "purged {} expired conversations and {} processed message ids",
                report.conversations_purged, report.processed_messages_purged
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("cleanup", error_class, message, exit_code)
        }
    }
}
