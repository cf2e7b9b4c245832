use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Confidence below this never executes a calendar action directly.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CreateEvent,
    QueryEvents,
    UpdateEvent,
    DeleteEvent,
    Greeting,
    Help,
    Unclear,
}

impl IntentKind {
    pub const ALL: [Self; 7] = [
        Self::CreateEvent,
        Self::QueryEvents,
        Self::UpdateEvent,
        Self::DeleteEvent,
        Self::Greeting,
        Self::Help,
        Self::Unclear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateEvent => "create_event",
            Self::QueryEvents => "query_events",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
            Self::Greeting => "greeting",
            Self::Help => "help",
            Self::Unclear => "unclear",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Kinds that read or write the calendar and therefore pass the clarification guard.
    pub fn touches_calendar(&self) -> bool {
        matches!(
            self,
            Self::CreateEvent | Self::QueryEvents | Self::UpdateEvent | Self::DeleteEvent
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DAILY" => Some(Self::Daily),
            "WEEKLY" => Some(Self::Weekly),
            "MONTHLY" => Some(Self::Monthly),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub day_of_week: Option<Weekday>,
    /// Last local day on which an occurrence may happen.
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntities {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub recurrence: Option<Recurrence>,
    pub all_day: bool,
    pub event_search_query: Option<String>,
}

impl CalendarEntities {
    /// Text used to look up an existing event.
    pub fn search_hint(&self) -> Option<&str> {
        self.event_search_query
            .as_deref()
            .or(self.title.as_deref())
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
    }

    /// New title for an update. Only set when the event was located through
    /// a separate search query, so the title is not just the lookup text.
    pub fn rename_to(&self) -> Option<&str> {
        let query = self.event_search_query.as_deref()?.trim();
        let title = self.title.as_deref()?.trim();
        (!title.is_empty() && !title.eq_ignore_ascii_case(query)).then_some(title)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    pub entities: CalendarEntities,
    pub confidence: f64,
    pub clarification: Option<String>,
}

impl Intent {
    pub fn is_confident(&self) -> bool {
        self.confidence >= CONFIDENCE_THRESHOLD
    }

    pub fn clarification_text(&self) -> Option<&str> {
        self.clarification.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }
}
