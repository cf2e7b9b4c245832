use std::fmt;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesId(pub String);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// When an event happens. Timed instants keep their named zone so series stay
/// anchored to local wall-clock time across DST changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventTiming {
    Timed { start: DateTime<Tz>, end: DateTime<Tz> },
    AllDay { start: NaiveDate, end_exclusive: NaiveDate },
}

impl EventTiming {
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay { .. })
    }

    pub fn start_date(&self) -> NaiveDate {
        match self {
            Self::Timed { start, .. } => start.date_naive(),
            Self::AllDay { start, .. } => *start,
        }
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        match self {
            Self::Timed { start, end } => Some((*end - *start).num_minutes()),
            Self::AllDay { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: EventId,
    pub title: String,
    pub timing: EventTiming,
    pub description: Option<String>,
    pub series_id: Option<SeriesId>,
}

impl CalendarEvent {
    pub fn is_all_day(&self) -> bool {
        self.timing.is_all_day()
    }

    pub fn is_recurring_instance(&self) -> bool {
        self.series_id.is_some()
    }

    /// Strict half-open overlap against `[start, end)`. All-day events never overlap.
    pub fn overlaps(&self, start: &DateTime<Tz>, end: &DateTime<Tz>) -> bool {
        match &self.timing {
            EventTiming::Timed { start: existing_start, end: existing_end } => {
                existing_start < end && existing_end > start
            }
            EventTiming::AllDay { .. } => false,
        }
    }
}
