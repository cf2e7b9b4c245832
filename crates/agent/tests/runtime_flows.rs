use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Europe::Berlin;
use serde_json::{json, Value};

use famcal_agent::llm::{LlmError, ProviderErrorKind, ScriptedLlmClient};
use famcal_agent::replies;
use famcal_agent::{AgentRuntime, AgentSettings, MessageOutcome};
use famcal_core::calendar::{CalendarGateway, InMemoryCalendar, NewEvent};
use famcal_core::domain::conversation::{ConversationState, PendingAction, SenderId};
use famcal_core::domain::family::FamilyWhitelist;
use famcal_core::domain::intent::{Frequency, Recurrence};
use famcal_core::messaging::{InboundMessage, MessageId, Recipient, RecordingSender};
use famcal_db::{
    ConversationRepository, InMemoryConversationRepository, InMemoryIdempotencyRepository,
    RepositoryError,
};

const ANNA: &str = "+4915100000001";

struct Harness {
    llm: Arc<ScriptedLlmClient>,
    calendar: Arc<InMemoryCalendar>,
    conversations: Arc<InMemoryConversationRepository>,
    sender: Arc<RecordingSender>,
    runtime: AgentRuntime,
}

fn harness() -> Harness {
    let llm = Arc::new(ScriptedLlmClient::default());
    let calendar = Arc::new(InMemoryCalendar::new(Berlin));
    let conversations = Arc::new(InMemoryConversationRepository::default());
    let processed = Arc::new(InMemoryIdempotencyRepository::default());
    let sender = Arc::new(RecordingSender::default());
    let whitelist = anna_only();

    let runtime = AgentRuntime::new(
        llm.clone(),
        calendar.clone(),
        conversations.clone(),
        processed,
        sender.clone(),
        Arc::new(whitelist),
        AgentSettings::default(),
    );
    Harness { llm, calendar, conversations, sender, runtime }
}

fn anna_only() -> FamilyWhitelist {
    FamilyWhitelist::from_toml_str(&format!("[[members]]\nphone = \"{ANNA}\"\nname = \"Anna\"\n"))
        .expect("whitelist")
}

/// Wednesday 2026-03-04, 10:00 in Berlin, plus `minutes`.
fn at_minute(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).single().expect("valid timestamp")
        + Duration::minutes(minutes)
}

fn message(id: &str, text: &str, minutes: i64) -> InboundMessage {
    InboundMessage::direct(
        SenderId(ANNA.to_string()),
        MessageId(id.to_string()),
        text,
        at_minute(minutes),
    )
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
}

fn create_intent(title: &str, day: &str, time: &str) -> Value {
    json!({
        "intent": "create_event",
        "entities": {"title": title, "date": day, "time": time},
        "confidence": 0.95
    })
}

async fn seed(calendar: &InMemoryCalendar, title: &str, day: u32, hour: u32) {
    calendar
        .create(&NewEvent {
            title: title.to_string(),
            date: date(day),
            time: NaiveTime::from_hms_opt(hour, 0, 0).expect("valid time"),
            duration_minutes: 60,
            description: None,
        })
        .await
        .expect("seed event");
}

async fn state_of(harness: &Harness, minutes: i64) -> Option<PendingAction> {
    harness
        .conversations
        .find_active(&SenderId(ANNA.to_string()), at_minute(minutes), Duration::minutes(30))
        .await
        .expect("load state")
        .and_then(|state| state.pending)
}

#[tokio::test]
async fn duplicate_delivery_has_one_side_effect_and_one_reply() {
    let harness = harness();
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:00")).await;
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:00")).await;

    let first = harness
        .runtime
        .handle_message(&message("m1", "Zahnarzt Montag 10 Uhr", 0))
        .await
        .expect("first delivery");
    let second = harness
        .runtime
        .handle_message(&message("m1", "Zahnarzt Montag 10 Uhr", 0))
        .await
        .expect("second delivery");

    assert!(matches!(first, MessageOutcome::Replied(_)));
    assert_eq!(second, MessageOutcome::Duplicate);
    assert_eq!(harness.llm.call_count().await, 1);
    assert_eq!(harness.calendar.stored_count().await, 1);
    assert_eq!(harness.sender.texts().await.len(), 1);
}

#[tokio::test]
async fn concurrent_duplicate_delivery_has_one_side_effect_and_one_reply() {
    let harness = harness();
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:00")).await;
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:00")).await;
    let delivery = message("m1", "Zahnarzt Montag 10 Uhr", 0);

    let (first, second) = tokio::join!(
        harness.runtime.handle_message(&delivery),
        harness.runtime.handle_message(&delivery)
    );
    let outcomes = [first.expect("first delivery"), second.expect("second delivery")];

    let duplicates =
        outcomes.iter().filter(|outcome| **outcome == MessageOutcome::Duplicate).count();
    assert_eq!(duplicates, 1);
    assert_eq!(harness.llm.call_count().await, 1);
    assert_eq!(harness.calendar.stored_count().await, 1);
    assert_eq!(harness.sender.texts().await.len(), 1);
}

/// Conversation store whose saves start failing after `healthy_saves` writes.
struct FailingSaves {
    inner: InMemoryConversationRepository,
    healthy_saves: usize,
    saves: AtomicUsize,
}

#[async_trait]
impl ConversationRepository for FailingSaves {
    async fn find_active(
        &self,
        sender: &SenderId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        self.inner.find_active(sender, now, ttl).await
    }

    async fn save(
        &self,
        state: &ConversationState,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if self.saves.fetch_add(1, Ordering::SeqCst) >= self.healthy_saves {
            return Err(RepositoryError::Decode("storage unavailable".to_string()));
        }
        self.inner.save(state, now).await
    }

    async fn clear(&self, sender: &SenderId) -> Result<(), RepositoryError> {
        self.inner.clear(sender).await
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<u64, RepositoryError> {
        self.inner.purge_expired(now, ttl).await
    }
}

#[tokio::test]
async fn state_write_failure_after_reply_sends_no_second_message() {
    let llm = Arc::new(ScriptedLlmClient::default());
    let calendar = Arc::new(InMemoryCalendar::new(Berlin));
    let sender = Arc::new(RecordingSender::default());
    let conversations = Arc::new(FailingSaves {
        inner: InMemoryConversationRepository::default(),
        healthy_saves: 1,
        saves: AtomicUsize::new(0),
    });
    seed(&calendar, "Training", 9, 10).await;
    llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:30")).await;
    let runtime = AgentRuntime::new(
        llm,
        calendar.clone(),
        conversations,
        Arc::new(InMemoryIdempotencyRepository::default()),
        sender.clone(),
        Arc::new(anna_only()),
        AgentSettings::default(),
    );

    let outcome = runtime
        .handle_message(&message("m1", "Zahnarzt Montag halb elf", 0))
        .await
        .expect("reply already sent");

    let question = "Achtung: Überschneidung mit Training um 10:00 Uhr. Trotzdem erstellen?";
    assert_eq!(outcome, MessageOutcome::Replied(question.to_string()));
    assert_eq!(sender.texts().await, vec![question.to_string()]);
    assert_eq!(calendar.stored_count().await, 1);
}

#[tokio::test]
async fn conflict_confirmation_round_trip_creates_after_yes() {
    let harness = harness();
    seed(&harness.calendar, "Training", 9, 10).await;
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:30")).await;

    harness
        .runtime
        .handle_message(&message("m1", "Zahnarzt Montag halb elf", 0))
        .await
        .expect("create request");
    let pending = state_of(&harness, 1).await;
    assert!(matches!(pending, Some(PendingAction::ConflictConfirmation { .. })));

    let outcome =
        harness.runtime.handle_message(&message("m2", "ja", 1)).await.expect("confirmation");

    assert_eq!(
        outcome,
        MessageOutcome::Replied(
            "Klar, hab ich eingetragen! Zahnarzt, Montag 10:30-11:30".to_string()
        )
    );
    assert_eq!(harness.llm.call_count().await, 1);
    assert_eq!(harness.calendar.stored_count().await, 2);
    assert!(harness.conversations.is_empty().await);

    let texts = harness.sender.texts().await;
    assert_eq!(
        texts[0],
        "Achtung: Überschneidung mit Training um 10:00 Uhr. Trotzdem erstellen?"
    );
}

#[tokio::test]
async fn declined_conflict_creates_nothing() {
    let harness = harness();
    seed(&harness.calendar, "Training", 9, 10).await;
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:00")).await;

    harness.runtime.handle_message(&message("m1", "Zahnarzt Montag 10", 0)).await.expect("ask");
    let outcome = harness
        .runtime
        .handle_message(&message("m2", "lieber nicht", 2))
        .await
        .expect("decline");

    assert_eq!(outcome, MessageOutcome::Replied(replies::CREATION_DECLINED.to_string()));
    assert_eq!(harness.calendar.stored_count().await, 1);
    assert_eq!(state_of(&harness, 2).await, None);
}

#[tokio::test]
async fn recurring_delete_scope_round_trip_with_reask() {
    let harness = harness();
    harness
        .calendar
        .create_recurring(
            &NewEvent {
                title: "Schwimmen".to_string(),
                date: date(2),
                time: NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
                duration_minutes: 60,
                description: None,
            },
            &Recurrence {
                frequency: Frequency::Weekly,
                day_of_week: Some(Weekday::Mon),
                end_date: None,
            },
        )
        .await
        .expect("create series");
    harness
        .llm
        .push_input(json!({
            "intent": "delete_event",
            "entities": {"event_search_query": "Schwimmen", "date": "2026-03-09"},
            "confidence": 0.9
        }))
        .await;

    harness
        .runtime
        .handle_message(&message("m1", "Lösch Schwimmen am Montag", 0))
        .await
        .expect("delete request");
    harness.runtime.handle_message(&message("m2", "keine Ahnung", 1)).await.expect("re-ask");
    assert!(matches!(state_of(&harness, 2).await, Some(PendingAction::DeleteScope { .. })));

    let outcome =
        harness.runtime.handle_message(&message("m3", "1", 2)).await.expect("scope answer");

    assert_eq!(outcome, MessageOutcome::Replied(replies::DELETED_THIS_ONLY.to_string()));
    assert_eq!(harness.llm.call_count().await, 1);
    assert!(harness.calendar.list(date(9)).await.expect("list").is_empty());
    assert_eq!(harness.calendar.list(date(16)).await.expect("list").len(), 1);
    assert_eq!(
        harness.sender.texts().await,
        vec![
            replies::DELETE_SCOPE_QUESTION.to_string(),
            replies::SCOPE_REASK.to_string(),
            replies::DELETED_THIS_ONLY.to_string(),
        ]
    );
}

#[tokio::test]
async fn history_keeps_only_the_latest_turns() {
    let harness = harness();
    for index in 0..4 {
        harness
            .llm
            .push_input(json!({"intent": "greeting", "entities": {}, "confidence": 1.0}))
            .await;
        harness
            .runtime
            .handle_message(&message(&format!("m{index}"), &format!("Hallo {index}"), index))
            .await
            .expect("greeting");
    }

    let state = harness
        .conversations
        .find_active(&SenderId(ANNA.to_string()), at_minute(4), Duration::minutes(30))
        .await
        .expect("load state")
        .expect("active state");
    assert_eq!(state.history.len(), 5);
    assert_eq!(state.history[0].content, replies::greeting(Some("Anna")));
    assert_eq!(state.history[1].content, "Hallo 2");

    let last_request = harness.llm.requests().await.pop().expect("last request");
    assert!(last_request.messages.len() <= 5);
}

#[tokio::test]
async fn expired_question_is_forgotten() {
    let harness = harness();
    seed(&harness.calendar, "Training", 9, 10).await;
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:00")).await;
    harness.llm.push_input(json!({"intent": "unclear", "entities": {}, "confidence": 0.3})).await;

    harness.runtime.handle_message(&message("m1", "Zahnarzt Montag 10", 0)).await.expect("ask");
    let outcome =
        harness.runtime.handle_message(&message("m2", "ja", 31)).await.expect("late answer");

    assert_eq!(outcome, MessageOutcome::Replied(replies::GENERIC_FALLBACK.to_string()));
    assert_eq!(harness.llm.call_count().await, 2);
    assert_eq!(harness.calendar.stored_count().await, 1);
}

#[tokio::test]
async fn cancel_command_drops_pending_question_without_model_call() {
    let harness = harness();
    seed(&harness.calendar, "Training", 9, 10).await;
    harness.llm.push_input(create_intent("Zahnarzt", "2026-03-09", "10:00")).await;

    harness.runtime.handle_message(&message("m1", "Zahnarzt Montag 10", 0)).await.expect("ask");
    let outcome =
        harness.runtime.handle_message(&message("m2", " Abbrechen ", 1)).await.expect("cancel");

    assert_eq!(outcome, MessageOutcome::Replied(replies::CANCELLED.to_string()));
    assert_eq!(harness.llm.call_count().await, 1);
    assert!(harness.conversations.is_empty().await);
}

#[tokio::test]
async fn extraction_failure_answers_without_opening_a_question() {
    let harness = harness();
    harness
        .llm
        .push_error(LlmError::Status {
            status: 529,
            kind: ProviderErrorKind::from_status(529),
            message: "overloaded".to_string(),
        })
        .await;

    let outcome = harness
        .runtime
        .handle_message(&message("m1", "Was steht heute an?", 0))
        .await
        .expect("handled");

    assert_eq!(outcome, MessageOutcome::Replied(replies::EXTRACTION_FAILED.to_string()));
    assert_eq!(state_of(&harness, 0).await, None);
}

#[tokio::test]
async fn group_messages_are_answered_in_the_group() {
    let harness = harness();
    harness
        .llm
        .push_input(json!({"intent": "query_events", "entities": {}, "confidence": 1.0}))
        .await;
    let mut inbound = message("m1", "Was steht heute an?", 0);
    inbound.reply_to = Recipient::Group("family-group".to_string());

    harness.runtime.handle_message(&inbound).await.expect("handled");

    let sent = harness.sender.sent().await;
    assert_eq!(
        sent,
        vec![(Recipient::Group("family-group".to_string()), "Mittwoch ist frei!".to_string())]
    );
}
