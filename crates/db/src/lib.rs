pub mod connection;
pub mod maintenance;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use maintenance::{purge_expired, CleanupReport, RetentionPolicy};
pub use repositories::{
    ConversationRepository, IdempotencyRepository, InMemoryConversationRepository,
    InMemoryIdempotencyRepository, RepositoryError, SqlConversationRepository,
    SqlIdempotencyRepository,
};
