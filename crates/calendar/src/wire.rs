use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use famcal_core::calendar::CalendarError;
use famcal_core::domain::event::{CalendarEvent, EventId, EventTiming, SeriesId};

const UNTITLED: &str = "(ohne Titel)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventList {
    #[serde(default)]
    pub items: Vec<GoogleEventRaw>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleEventRaw {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
    #[serde(default)]
    pub recurring_event_id: Option<String>,
    #[serde(default)]
    pub recurrence: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn timed(instant: &DateTime<Tz>) -> Self {
        Self {
            date_time: Some(instant.to_rfc3339()),
            date: None,
            time_zone: Some(instant.timezone().name().to_string()),
        }
    }

    pub fn all_day(date: NaiveDate) -> Self {
        Self { date_time: None, date: Some(date.format("%Y-%m-%d").to_string()), time_zone: None }
    }
}

/// Body for inserts and patches; absent fields are left untouched by a patch.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
}

impl EventWrite {
    pub fn with_timing(mut self, timing: &EventTiming) -> Self {
        match timing {
            EventTiming::Timed { start, end } => {
                self.start = Some(EventDateTime::timed(start));
                self.end = Some(EventDateTime::timed(end));
            }
            EventTiming::AllDay { start, end_exclusive } => {
                self.start = Some(EventDateTime::all_day(*start));
                self.end = Some(EventDateTime::all_day(*end_exclusive));
            }
        }
        self
    }
}

impl GoogleEventRaw {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    pub fn into_event(self, tz: Tz) -> Result<CalendarEvent, CalendarError> {
        let start = self
            .start
            .as_ref()
            .ok_or_else(|| CalendarError::Api(format!("event `{}` has no start", self.id)))?;
        let end = self
            .end
            .as_ref()
            .ok_or_else(|| CalendarError::Api(format!("event `{}` has no end", self.id)))?;

        let timing = match (&start.date_time, &start.date) {
            (Some(start_raw), _) => EventTiming::Timed {
                start: parse_instant(start_raw, tz)?,
                end: parse_instant(end.date_time.as_deref().unwrap_or_default(), tz)?,
            },
            (None, Some(start_raw)) => EventTiming::AllDay {
                start: parse_date(start_raw)?,
                end_exclusive: parse_date(end.date.as_deref().unwrap_or_default())?,
            },
            (None, None) => {
                return Err(CalendarError::Api(format!("event `{}` has an empty start", self.id)))
            }
        };

        Ok(CalendarEvent {
            id: EventId(self.id),
            title: self
                .summary
                .filter(|summary| !summary.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            timing,
            description: self.description.filter(|description| !description.is_empty()),
            series_id: self.recurring_event_id.map(SeriesId),
        })
    }

    /// Index of the RRULE line in `recurrence`, if the event is a series master.
    pub fn rule_index(&self) -> Option<usize> {
        self.recurrence.iter().position(|line| line.starts_with("RRULE:"))
    }
}

fn parse_instant(raw: &str, tz: Tz) -> Result<DateTime<Tz>, CalendarError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|instant| instant.with_timezone(&tz))
        .map_err(|error| CalendarError::Api(format!("invalid event dateTime `{raw}`: {error}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, CalendarError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| CalendarError::Api(format!("invalid event date `{raw}`: {error}")))
}
