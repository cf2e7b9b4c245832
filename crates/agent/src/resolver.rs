//! Turns an extracted intent, or the answer to a pending question, into
//! calendar operations and exactly one reply.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{info, warn};

use famcal_core::calendar::{
    CalendarError, CalendarGateway, EventChanges, EventQuery, NewAllDayEvent, NewEvent,
    SearchOutcome, DEFAULT_DURATION_MINUTES,
};
use famcal_core::domain::conversation::{PendingAction, PendingEvent};
use famcal_core::domain::intent::{CalendarEntities, Frequency, Intent, IntentKind};
use famcal_core::flows::FlowEvent;
use famcal_core::time::{self, recurrence};

use crate::classifier::{classify_confirmation, classify_scope, ConfirmationAnswer, ScopeAnswer};
use crate::guardrails::{ClarificationGuard, GuardrailDecision};
use crate::replies;

/// Longest range a single query renders.
const MAX_QUERY_DAYS: usize = 31;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub reply: String,
    pub event: FlowEvent,
    /// Question to remember when `event` opens one.
    pub pending: Option<PendingAction>,
}

impl Resolution {
    pub fn answered(reply: impl Into<String>) -> Self {
        Self::with_event(reply, FlowEvent::Answered)
    }

    fn with_event(reply: impl Into<String>, event: FlowEvent) -> Self {
        Self { reply: reply.into(), event, pending: None }
    }

    fn asking(reply: impl Into<String>, pending: PendingAction, event: FlowEvent) -> Self {
        Self { reply: reply.into(), event, pending: Some(pending) }
    }
}

pub struct IntentResolver {
    calendar: Arc<dyn CalendarGateway>,
    guard: ClarificationGuard,
    search_window_days: u64,
}

impl IntentResolver {
    pub fn new(calendar: Arc<dyn CalendarGateway>, search_window_days: u64) -> Self {
        Self { calendar, guard: ClarificationGuard, search_window_days }
    }

    pub async fn resolve_intent(
        &self,
        intent: &Intent,
        now: DateTime<Utc>,
        display_name: Option<&str>,
    ) -> Resolution {
        match intent.kind {
            IntentKind::Greeting => return Resolution::answered(replies::greeting(display_name)),
            IntentKind::Help => return Resolution::answered(replies::HELP_TEXT),
            _ => {}
        }

        if let GuardrailDecision::Clarify { reason_code, user_message } =
            self.guard.evaluate(intent)
        {
            info!(
                event_name = "agent.clarification_requested",
                intent = intent.kind.as_str(),
                confidence = intent.confidence,
                reason_code,
                "asking back before touching the calendar"
            );
            return Resolution::answered(user_message);
        }

        let entities = &intent.entities;
        let result = match intent.kind {
            IntentKind::QueryEvents => self.query(entities, now).await,
            IntentKind::CreateEvent => self.create(entities, now).await,
            IntentKind::UpdateEvent => self.update(entities, now).await,
            IntentKind::DeleteEvent => self.delete(entities, now).await,
            IntentKind::Greeting | IntentKind::Help | IntentKind::Unclear => {
                Ok(Resolution::answered(replies::GENERIC_FALLBACK))
            }
        };

        result.unwrap_or_else(|error| {
            warn!(
                event_name = "agent.calendar_failed",
                intent = intent.kind.as_str(),
                error_kind = error.kind(),
                error = %error,
                "calendar operation failed"
            );
            Resolution::answered(replies::calendar_error(&error))
        })
    }

    /// Answers the open question with the raw message text.
    pub async fn resolve_pending(&self, pending: &PendingAction, text: &str) -> Resolution {
        match pending {
            PendingAction::ConflictConfirmation { event } => match classify_confirmation(text) {
                ConfirmationAnswer::Negative => Resolution::with_event(
                    replies::CREATION_DECLINED,
                    FlowEvent::ConfirmationDeclined,
                ),
                ConfirmationAnswer::Affirmative => match self.execute_create(event).await {
                    Ok(reply) => Resolution::with_event(reply, FlowEvent::ConfirmationAccepted),
                    Err(error) => pending_failure(pending, error),
                },
            },
            PendingAction::DeleteScope { event_id, series_id, instance_date, .. } => {
                match classify_scope(text) {
                    ScopeAnswer::ThisOnly => match self.calendar.delete(event_id).await {
                        Ok(()) => Resolution::with_event(
                            replies::DELETED_THIS_ONLY,
                            FlowEvent::ScopeThisOnly,
                        ),
                        Err(error) => pending_failure(pending, error),
                    },
                    ScopeAnswer::AllFuture => {
                        match self.calendar.trim_series(series_id, *instance_date).await {
                            Ok(()) => Resolution::with_event(
                                replies::series_trimmed(*instance_date),
                                FlowEvent::ScopeAllFuture,
                            ),
                            Err(error) => pending_failure(pending, error),
                        }
                    }
                    ScopeAnswer::Unrecognized => {
                        Resolution::with_event(replies::SCOPE_REASK, FlowEvent::ScopeUnrecognized)
                    }
                }
            }
        }
    }

    async fn query(
        &self,
        entities: &CalendarEntities,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CalendarError> {
        let date = entities.date.unwrap_or_else(|| time::today(now, self.calendar.timezone()));

        let Some(last) = entities.date_end.filter(|end| *end > date) else {
            let events = self.calendar.list(date).await?;
            return Ok(Resolution::answered(replies::day_overview(date, &events)));
        };

        let mut days = Vec::new();
        for day in date.iter_days().take_while(|day| *day <= last).take(MAX_QUERY_DAYS) {
            days.push((day, self.calendar.list(day).await?));
        }
        Ok(Resolution::answered(replies::range_overview(&days)))
    }

    async fn create(
        &self,
        entities: &CalendarEntities,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CalendarError> {
        let tz = self.calendar.timezone();
        let title = entities
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(replies::DEFAULT_TITLE)
            .to_string();

        if entities.all_day {
            let start_date = entities.date.unwrap_or_else(|| time::today(now, tz));
            let last_day = entities.date_end.filter(|end| *end >= start_date).unwrap_or(start_date);
            let event = NewAllDayEvent {
                title,
                start_date,
                end_date_exclusive: last_day.succ_opt().unwrap_or(last_day),
                description: None,
            };
            let created = self.calendar.create_all_day(&event).await?;
            return Ok(Resolution::answered(replies::created(&created)));
        }

        let Some(at) = entities.time else {
            return Ok(Resolution::answered(replies::ASK_TIME));
        };
        let Some(duration_minutes) = requested_duration(entities) else {
            return Ok(Resolution::answered(replies::END_BEFORE_START));
        };

        let mut date = entities.date.unwrap_or_else(|| time::resolve_implicit_date(at, now, tz));
        if let Some(rule) = &entities.recurrence {
            if let (Frequency::Weekly, Some(weekday)) = (rule.frequency, rule.day_of_week) {
                date = recurrence::align_weekly_start(date, weekday);
            }
        }

        let event = PendingEvent {
            title,
            date,
            time: at,
            duration_minutes,
            description: None,
            recurrence: entities.recurrence.clone(),
        };

        let start = time::combine(date, at, tz);
        let end = time::add_duration(start, i64::from(duration_minutes));
        let conflicts = self.calendar.find_conflicts(&start, &end).await?;
        if !conflicts.is_empty() {
            info!(
                event_name = "agent.conflict_detected",
                %date,
                conflicts = conflicts.len(),
                "new event overlaps existing events"
            );
            return Ok(Resolution::asking(
                replies::conflict_question(&conflicts),
                PendingAction::ConflictConfirmation { event },
                FlowEvent::ConflictDetected,
            ));
        }

        Ok(Resolution::answered(self.execute_create(&event).await?))
    }

    async fn execute_create(&self, event: &PendingEvent) -> Result<String, CalendarError> {
        let new_event = NewEvent {
            title: event.title.clone(),
            date: event.date,
            time: event.time,
            duration_minutes: event.duration_minutes,
            description: event.description.clone(),
        };

        match &event.recurrence {
            Some(rule) => {
                let created = self.calendar.create_recurring(&new_event, rule).await?;
                let reply = replies::created_recurring(
                    &created.event.title,
                    rule,
                    &created.next_occurrences,
                );
                Ok(reply)
            }
            None => Ok(replies::created(&self.calendar.create(&new_event).await?)),
        }
    }

    async fn update(
        &self,
        entities: &CalendarEntities,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CalendarError> {
        if entities.search_hint().is_none() && entities.date.is_none() {
            return Ok(Resolution::answered(replies::UPDATE_FALLBACK));
        }
        let duration_minutes = match (entities.time, entities.end_time) {
            (Some(_), Some(_)) => match requested_duration(entities) {
                Some(minutes) => Some(minutes),
                None => return Ok(Resolution::answered(replies::END_BEFORE_START)),
            },
            _ => entities.duration_minutes,
        };

        let mut outcome = self.locate(entities, entities.date, now).await?;
        if outcome == SearchOutcome::NotFound
            && entities.date.is_some()
            && entities.search_hint().is_some()
        {
            // The date may name the new day rather than the current one.
            outcome = self.locate(entities, None, now).await?;
        }

        let event = match outcome {
            SearchOutcome::NotFound => return Ok(Resolution::answered(replies::NOT_FOUND)),
            SearchOutcome::Candidates(events) => {
                return Ok(Resolution::answered(replies::candidates(&events)))
            }
            SearchOutcome::Single(event) => event,
        };

        let changes = EventChanges {
            title: entities.rename_to().map(str::to_string),
            date: entities.date,
            time: entities.time,
            duration_minutes,
        };
        if changes.is_empty() {
            return Ok(Resolution::answered(replies::NOTHING_TO_CHANGE));
        }

        let updated = self.calendar.update(&event.id, &changes).await?;
        Ok(Resolution::answered(replies::updated(&updated)))
    }

    async fn delete(
        &self,
        entities: &CalendarEntities,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CalendarError> {
        if entities.search_hint().is_none() && entities.date.is_none() {
            return Ok(Resolution::answered(replies::DELETE_FALLBACK));
        }

        let event = match self.locate(entities, entities.date, now).await? {
            SearchOutcome::NotFound => return Ok(Resolution::answered(replies::NOT_FOUND)),
            SearchOutcome::Candidates(events) => {
                return Ok(Resolution::answered(replies::candidates(&events)))
            }
            SearchOutcome::Single(event) => event,
        };

        let instance_date = event.timing.start_date();
        match event.series_id {
            Some(series_id) => Ok(Resolution::asking(
                replies::DELETE_SCOPE_QUESTION,
                PendingAction::DeleteScope {
                    event_id: event.id,
                    series_id,
                    instance_date,
                    title: event.title,
                },
                FlowEvent::RecurringInstanceSelected,
            )),
            None => {
                self.calendar.delete(&event.id).await?;
                Ok(Resolution::answered(replies::deleted(&event.title, instance_date)))
            }
        }
    }

    /// Searches `date` (and `date_end`) when given, otherwise the window
    /// starting today.
    async fn locate(
        &self,
        entities: &CalendarEntities,
        date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<SearchOutcome, CalendarError> {
        let title_hint = entities.search_hint().map(str::to_string);
        let query = match date {
            Some(date) => EventQuery { date, date_end: entities.date_end, title_hint },
            None => {
                let today = time::today(now, self.calendar.timezone());
                EventQuery {
                    date: today,
                    date_end: today.checked_add_days(Days::new(self.search_window_days)),
                    title_hint,
                }
            }
        };
        self.calendar.find(&query).await
    }
}

/// Minutes between `time` and `end_time` when both are set, else the stated
/// duration or the default. `None` when the end is not after the start.
fn requested_duration(entities: &CalendarEntities) -> Option<u32> {
    match (entities.time, entities.end_time) {
        (Some(start), Some(end)) => {
            let minutes = time::minutes_between(start, end);
            u32::try_from(minutes).ok().filter(|minutes| *minutes > 0)
        }
        _ => Some(entities.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES)),
    }
}

/// A vanished or inaccessible target ends the question; anything else keeps it open.
fn pending_failure(pending: &PendingAction, error: CalendarError) -> Resolution {
    let event = match error {
        CalendarError::NotFound | CalendarError::PermissionDenied => FlowEvent::PendingAborted,
        CalendarError::RateLimited | CalendarError::Api(_) => FlowEvent::PendingRetained,
    };
    warn!(
        event_name = "agent.pending_action_failed",
        pending = pending.marker(),
        error_kind = error.kind(),
        error = %error,
        "calendar operation for pending answer failed"
    );
    Resolution::with_event(replies::calendar_error(&error), event)
}
