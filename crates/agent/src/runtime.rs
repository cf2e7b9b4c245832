use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use famcal_core::calendar::CalendarGateway;
use famcal_core::config::ConversationConfig;
use famcal_core::domain::conversation::{
    ConversationState, HistoryTurn, PendingAction, SenderId,
};
use famcal_core::domain::family::FamilyWhitelist;
use famcal_core::errors::ApplicationError;
use famcal_core::flows::{
    ConversationFlow, ConversationPhase, FlowEngine, FlowEvent, TransitionOutcome,
};
use famcal_core::messaging::{InboundMessage, MessageSender};
use famcal_db::repositories::{ConversationRepository, IdempotencyRepository, RepositoryError};

use crate::commands::Command;
use crate::conversation::IntentExtractor;
use crate::llm::LlmClient;
use crate::replies;
use crate::resolver::{IntentResolver, Resolution};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub session_ttl: Duration,
    pub max_history: usize,
    pub search_window_days: u64,
}

impl AgentSettings {
    pub fn from_config(config: &ConversationConfig) -> Self {
        Self {
            session_ttl: Duration::minutes(
                i64::try_from(config.session_ttl_minutes).unwrap_or(i64::MAX / 60_000),
            ),
            max_history: config.max_history,
            search_window_days: config.search_window_days,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { session_ttl: Duration::minutes(30), max_history: 5, search_window_days: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The message id was already processed; nothing was sent.
    Duplicate,
    Replied(String),
}

/// Handles one inbound message end to end: dedup, state, extraction,
/// resolution, reply and state persistence.
pub struct AgentRuntime {
    extractor: IntentExtractor,
    resolver: IntentResolver,
    conversations: Arc<dyn ConversationRepository>,
    processed: Arc<dyn IdempotencyRepository>,
    sender: Arc<dyn MessageSender>,
    whitelist: Arc<FamilyWhitelist>,
    engine: FlowEngine<ConversationFlow>,
    settings: AgentSettings,
    tz: Tz,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        calendar: Arc<dyn CalendarGateway>,
        conversations: Arc<dyn ConversationRepository>,
        processed: Arc<dyn IdempotencyRepository>,
        sender: Arc<dyn MessageSender>,
        whitelist: Arc<FamilyWhitelist>,
        settings: AgentSettings,
    ) -> Self {
        let tz = calendar.timezone();
        Self {
            extractor: IntentExtractor::new(llm, settings.max_history),
            resolver: IntentResolver::new(calendar, settings.search_window_days),
            conversations,
            processed,
            sender,
            whitelist,
            engine: FlowEngine::default(),
            settings,
            tz,
        }
    }

    pub async fn handle_message(
        &self,
        message: &InboundMessage,
    ) -> Result<MessageOutcome, ApplicationError> {
        let now = message.received_at;

        if self.processed.is_processed(&message.message_id).await.map_err(persistence)?
            || !self.processed.mark_processed(&message.message_id, now).await.map_err(persistence)?
        {
            debug!(
                event_name = "agent.message_duplicate",
                correlation_id = %message.message_id,
                "skipping already processed message"
            );
            return Ok(MessageOutcome::Duplicate);
        }

        let reply = match Command::parse(&message.text) {
            Some(command) => self.run_command(command, message, now).await?,
            None => self.converse(message, now).await?,
        };
        Ok(MessageOutcome::Replied(reply))
    }

    async fn run_command(
        &self,
        command: Command,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<String, ApplicationError> {
        let state = self.load_state(&message.sender, now).await?;
        let phase = ConversationPhase::of(state.as_ref().and_then(|state| state.pending.as_ref()));
        self.engine.apply(&phase, &FlowEvent::CommandIssued)?;

        self.conversations.clear(&message.sender).await.map_err(persistence)?;
        info!(
            event_name = "agent.command_handled",
            correlation_id = %message.message_id,
            sender = %message.sender,
            command = command.as_str(),
            from = phase.as_str(),
            "conversation reset by command"
        );

        let reply = command.reply().to_string();
        self.deliver(message, &reply).await;
        Ok(reply)
    }

    async fn converse(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<String, ApplicationError> {
        let sender = &message.sender;
        let (history, pending) = match self.load_state(sender, now).await? {
            Some(state) => (state.history, state.pending),
            None => (Vec::new(), None),
        };
        let phase = ConversationPhase::of(pending.as_ref());

        self.append_turn(sender, HistoryTurn::user(message.text.trim()), now).await?;

        let resolution = match &pending {
            Some(pending) => self.resolver.resolve_pending(pending, &message.text).await,
            None => self.resolve_text(message, &history, now).await,
        };

        let (reply, outcome) = match self.engine.apply(&phase, &resolution.event) {
            Ok(outcome) => (resolution.reply, Some(outcome)),
            Err(transition_error) => {
                error!(
                    event_name = "agent.flow_transition_rejected",
                    correlation_id = %message.message_id,
                    sender = %sender,
                    error = %transition_error,
                    "resolution produced an invalid transition"
                );
                (replies::APOLOGY.to_string(), None)
            }
        };

        self.deliver(message, &reply).await;

        // The reply is out; a failed write must not trigger a second answer.
        if let Err(persist_error) =
            self.record_reply(sender, &reply, outcome.as_ref(), resolution.pending, now).await
        {
            error!(
                event_name = "agent.state_persist_failed",
                correlation_id = %message.message_id,
                sender = %sender,
                error_class = persist_error.error_class(),
                error = %persist_error,
                "reply sent but conversation state was not saved"
            );
        }

        Ok(reply)
    }

    async fn record_reply(
        &self,
        sender: &SenderId,
        reply: &str,
        outcome: Option<&TransitionOutcome>,
        pending: Option<PendingAction>,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let mut state = self.append_turn(sender, HistoryTurn::assistant(reply), now).await?;

        match outcome {
            Some(outcome) if outcome.persists_pending() => {
                state.pending = pending;
                self.conversations.save(&state, now).await.map_err(persistence)?;
            }
            Some(outcome) if !outcome.clears_conversation() => {}
            _ => self.conversations.clear(sender).await.map_err(persistence)?,
        }
        Ok(())
    }

    async fn resolve_text(
        &self,
        message: &InboundMessage,
        history: &[HistoryTurn],
        now: DateTime<Utc>,
    ) -> Resolution {
        match self.extractor.extract(&message.text, history, now, self.tz).await {
            Ok(intent) => {
                info!(
                    event_name = "agent.intent_extracted",
                    correlation_id = %message.message_id,
                    sender = %message.sender,
                    intent = intent.kind.as_str(),
                    confidence = intent.confidence,
                    "intent extracted"
                );
                let display_name = self.whitelist.display_name(&message.sender.0);
                self.resolver.resolve_intent(&intent, now, display_name).await
            }
            Err(extraction_error) => {
                warn!(
                    event_name = "agent.intent_extraction_failed",
                    correlation_id = %message.message_id,
                    sender = %message.sender,
                    error = %extraction_error,
                    "intent extraction failed"
                );
                Resolution::answered(replies::EXTRACTION_FAILED)
            }
        }
    }

    /// Active state of `sender`. A stored state that no longer decodes is
    /// dropped so the conversation starts fresh.
    async fn load_state(
        &self,
        sender: &SenderId,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationState>, ApplicationError> {
        match self.conversations.find_active(sender, now, self.settings.session_ttl).await {
            Ok(state) => Ok(state),
            Err(RepositoryError::Decode(detail)) => {
                warn!(
                    event_name = "agent.conversation_state_discarded",
                    sender = %sender,
                    detail = %detail,
                    "discarding undecodable conversation state"
                );
                self.conversations.clear(sender).await.map_err(persistence)?;
                Ok(None)
            }
            Err(repository_error) => Err(persistence(repository_error)),
        }
    }

    async fn append_turn(
        &self,
        sender: &SenderId,
        turn: HistoryTurn,
        now: DateTime<Utc>,
    ) -> Result<ConversationState, ApplicationError> {
        self.conversations
            .append_history(sender, turn, self.settings.max_history, now, self.settings.session_ttl)
            .await
            .map_err(persistence)
    }

    async fn deliver(&self, message: &InboundMessage, reply: &str) {
        if let Err(send_error) = self.sender.send(&message.reply_to, reply).await {
            warn!(
                event_name = "agent.reply_send_failed",
                correlation_id = %message.message_id,
                recipient = %message.reply_to,
                error = %send_error,
                "failed to send reply"
            );
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
