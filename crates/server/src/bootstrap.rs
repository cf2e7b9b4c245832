use std::sync::Arc;

use chrono::{Duration, Utc};
use famcal_agent::{AgentRuntime, AgentSettings, AnthropicClient, LlmError};
use famcal_calendar::GoogleCalendar;
use famcal_core::calendar::{CalendarError, CalendarGateway};
use famcal_core::config::{AppConfig, ConfigError, LoadOptions, MessengerTransport};
use famcal_core::domain::family::{FamilyWhitelist, WhitelistError};
use famcal_core::messaging::{MessageSender, SendError};
use famcal_db::{
    connect_with_settings, migrations, purge_expired, ConversationRepository, DbPool,
    IdempotencyRepository, RepositoryError, RetentionPolicy, SqlConversationRepository,
    SqlIdempotencyRepository,
};
use famcal_messenger::signal::{ReconnectPolicy, SignalListener, SignalSender, TcpSignalTransport};
use famcal_messenger::whatsapp::{WebhookState, WhatsAppSender, QUEUE_CAPACITY};
use famcal_messenger::{AccessGate, InboundMessageService, IngressEvent};
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub conversations: Arc<dyn ConversationRepository>,
    pub processed: Arc<dyn IdempotencyRepository>,
    pub service: Arc<InboundMessageService>,
    pub ingress: Ingress,
}

/// The selected transport's receive side, ready to run.
pub enum Ingress {
    Signal(SignalListener),
    WhatsApp { webhook: WebhookState, queue: mpsc::Receiver<IngressEvent> },
}

impl Ingress {
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Signal(_) => MessengerTransport::Signal.as_str(),
            Self::WhatsApp { .. } => MessengerTransport::Whatsapp.as_str(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("startup cleanup failed: {0}")]
    Cleanup(#[source] RepositoryError),
    #[error(transparent)]
    Whitelist(#[from] WhitelistError),
    #[error("calendar gateway setup failed: {0}")]
    Calendar(#[source] CalendarError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("message sender setup failed: {0}")]
    Sender(#[source] SendError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        transport = config.messenger.transport.as_str(),
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "database connected and migrations applied"
    );

    let conversations: Arc<dyn ConversationRepository> =
        Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let processed: Arc<dyn IdempotencyRepository> =
        Arc::new(SqlIdempotencyRepository::new(db_pool.clone()));

    let report = purge_expired(
        conversations.as_ref(),
        processed.as_ref(),
        RetentionPolicy::from_config(&config.conversation),
        Utc::now(),
    )
    .await
    .map_err(BootstrapError::Cleanup)?;
    info!(
        event_name = "system.bootstrap.cleanup",
        correlation_id = "bootstrap",
        conversations_purged = report.conversations_purged,
        processed_messages_purged = report.processed_messages_purged,
        "purged stale state"
    );

    let whitelist = Arc::new(FamilyWhitelist::load(&config.family.members_path)?);
    info!(
        event_name = "system.bootstrap.whitelist_loaded",
        correlation_id = "bootstrap",
        members = whitelist.len(),
        "family whitelist loaded"
    );

    let calendar: Arc<dyn CalendarGateway> =
        Arc::new(GoogleCalendar::from_config(&config.calendar).map_err(BootstrapError::Calendar)?);
    let llm = Arc::new(AnthropicClient::from_config(&config.llm).map_err(BootstrapError::Llm)?);

    let sender: Arc<dyn MessageSender> = match config.messenger.transport {
        MessengerTransport::Signal => Arc::new(SignalSender::from_config(&config.signal)),
        MessengerTransport::Whatsapp => Arc::new(
            WhatsAppSender::from_config(&config.whatsapp).map_err(BootstrapError::Sender)?,
        ),
    };

    let runtime = AgentRuntime::new(
        llm,
        calendar,
        conversations.clone(),
        processed.clone(),
        sender.clone(),
        whitelist.clone(),
        AgentSettings::from_config(&config.conversation),
    );
    let gate = AccessGate::new(
        whitelist,
        Duration::seconds(config.conversation.rejection_cooldown_secs as i64),
    );
    let service = Arc::new(InboundMessageService::new(gate, Arc::new(runtime), sender));

    let ingress = match config.messenger.transport {
        MessengerTransport::Signal => Ingress::Signal(SignalListener::new(
            Arc::new(TcpSignalTransport::new(config.signal.rpc_address.clone())),
            service.clone(),
            ReconnectPolicy::default(),
            config.signal.max_concurrent,
        )),
        MessengerTransport::Whatsapp => {
            let (queue_tx, queue) = mpsc::channel(QUEUE_CAPACITY);
            let webhook = WebhookState::new(
                required_secret(config.whatsapp.app_secret.clone()),
                required_secret(config.whatsapp.verify_token.clone()),
                processed.clone(),
                queue_tx,
            );
            Ingress::WhatsApp { webhook, queue }
        }
    };

    Ok(Application { config, db_pool, conversations, processed, service, ingress })
}

/// Presence is enforced by config validation; an empty secret fails every check.
fn required_secret(value: Option<SecretString>) -> SecretString {
    value.unwrap_or_else(|| SecretString::from(String::new()))
}
