//! Calendar gateway seam: the typed operations the conversation engine runs
//! against the shared family calendar, plus the pure planning helpers every
//! backend shares.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use thiserror::Error;

use crate::domain::event::{CalendarEvent, EventId, EventTiming, SeriesId};
use crate::domain::intent::{Frequency, Recurrence};
use crate::time::{self, recurrence, TimeError};

pub use memory::InMemoryCalendar;

pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const OCCURRENCE_PREVIEW: usize = 3;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("calendar event not found")]
    NotFound,
    #[error("calendar access denied")]
    PermissionDenied,
    #[error("calendar rate limit exceeded")]
    RateLimited,
    #[error("calendar api error: {0}")]
    Api(String),
}

impl CalendarError {
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        match status {
            403 => Self::PermissionDenied,
            404 | 410 => Self::NotFound,
            429 => Self::RateLimited,
            _ => Self::Api(format!("status {status}: {}", detail.into())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::RateLimited => "rate_limited",
            Self::Api(_) => "api_error",
        }
    }
}

impl From<TimeError> for CalendarError {
    fn from(error: TimeError) -> Self {
        Self::Api(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventQuery {
    pub date: NaiveDate,
    pub date_end: Option<NaiveDate>,
    pub title_hint: Option<String>,
}

impl EventQuery {
    pub fn last_date(&self) -> NaiveDate {
        self.date_end.filter(|end| *end >= self.date).unwrap_or(self.date)
    }

    pub fn matches(&self, event: &CalendarEvent) -> bool {
        let date = event.timing.start_date();
        if date < self.date || date > self.last_date() {
            return false;
        }

        match self.title_hint.as_deref().map(str::trim).filter(|hint| !hint.is_empty()) {
            Some(hint) => event.title.to_lowercase().contains(&hint.to_lowercase()),
            None => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    Single(CalendarEvent),
    Candidates(Vec<CalendarEvent>),
    NotFound,
}

impl SearchOutcome {
    pub fn from_matches(mut matches: Vec<CalendarEvent>) -> Self {
        match matches.len() {
            0 => Self::NotFound,
            1 => matches.pop().map_or(Self::NotFound, Self::Single),
            _ => Self::Candidates(matches),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub description: Option<String>,
}

impl NewEvent {
    pub fn start(&self, tz: Tz) -> DateTime<Tz> {
        time::combine(self.date, self.time, tz)
    }

    pub fn end(&self, tz: Tz) -> DateTime<Tz> {
        time::add_duration(self.start(tz), i64::from(self.duration_minutes))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAllDayEvent {
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date_exclusive: NaiveDate,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventChanges {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.duration_minutes.is_none()
    }

    pub fn moves_event(&self) -> bool {
        self.date.is_some() || self.time.is_some() || self.duration_minutes.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecurringCreated {
    pub event: CalendarEvent,
    pub next_occurrences: Vec<DateTime<Tz>>,
}

/// Backend-neutral plan for a new recurring series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecurringPlan {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub rule: String,
    pub preview: Vec<DateTime<Tz>>,
}

pub fn plan_recurring(event: &NewEvent, recurrence: &Recurrence, tz: Tz) -> RecurringPlan {
    let date = match (recurrence.frequency, recurrence.day_of_week) {
        (Frequency::Weekly, Some(weekday)) => recurrence::align_weekly_start(event.date, weekday),
        _ => event.date,
    };
    let start = time::combine(date, event.time, tz);
    let end = time::add_duration(start, i64::from(event.duration_minutes));
    let rule = recurrence::format_recurrence_rule(
        recurrence.frequency,
        recurrence.day_of_week,
        recurrence.end_date,
        tz,
    );
    let preview = recurrence::next_occurrences(start, recurrence.frequency, OCCURRENCE_PREVIEW);

    RecurringPlan { start, end, rule, preview }
}

/// New timing for `existing` after `changes`. A missing date or time is taken
/// from the existing event; a missing duration keeps the existing one.
pub fn reschedule(existing: &EventTiming, changes: &EventChanges, tz: Tz) -> EventTiming {
    if !changes.moves_event() {
        return existing.clone();
    }

    let (current_date, current_time, current_minutes) = match existing {
        EventTiming::Timed { start, end } => {
            (start.date_naive(), Some(start.time()), (*end - *start).num_minutes())
        }
        EventTiming::AllDay { start, .. } => (*start, None, i64::from(DEFAULT_DURATION_MINUTES)),
    };

    let Some(at) = changes.time.or(current_time) else {
        // All-day event moved to another day without a time stays all-day.
        let date = changes.date.unwrap_or(current_date);
        let days = match existing {
            EventTiming::AllDay { start, end_exclusive } => (*end_exclusive - *start).num_days(),
            EventTiming::Timed { .. } => 1,
        };
        return EventTiming::AllDay {
            start: date,
            end_exclusive: date + chrono::Duration::days(days.max(1)),
        };
    };

    let date = changes.date.unwrap_or(current_date);
    let minutes = changes.duration_minutes.map_or(current_minutes, i64::from);
    let start = time::combine(date, at, tz);
    EventTiming::Timed { start, end: time::add_duration(start, minutes) }
}

#[async_trait]
pub trait CalendarGateway: Send + Sync {
    fn timezone(&self) -> Tz;

    /// Events of one local day, recurring series expanded, ordered by start.
    async fn list(&self, date: NaiveDate) -> Result<Vec<CalendarEvent>, CalendarError>;

    async fn find(&self, query: &EventQuery) -> Result<SearchOutcome, CalendarError>;

    async fn create(&self, event: &NewEvent) -> Result<CalendarEvent, CalendarError>;

    async fn create_all_day(&self, event: &NewAllDayEvent)
        -> Result<CalendarEvent, CalendarError>;

    async fn create_recurring(
        &self,
        event: &NewEvent,
        recurrence: &Recurrence,
    ) -> Result<RecurringCreated, CalendarError>;

    async fn update(
        &self,
        event_id: &EventId,
        changes: &EventChanges,
    ) -> Result<CalendarEvent, CalendarError>;

    async fn delete(&self, event_id: &EventId) -> Result<(), CalendarError>;

    /// Ends the series so no occurrence falls on or after `cutover`.
    async fn trim_series(&self, series_id: &SeriesId, cutover: NaiveDate)
        -> Result<(), CalendarError>;

    /// Timed events on the local day of `start` overlapping `[start, end)`.
    async fn find_conflicts(
        &self,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let events = self.list(start.date_naive()).await?;
        Ok(events.into_iter().filter(|event| event.overlaps(start, end)).collect())
    }
}
