use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use famcal_core::calendar::{
    plan_recurring, reschedule, CalendarError, CalendarGateway, EventChanges, EventQuery,
    NewAllDayEvent, NewEvent, RecurringCreated, SearchOutcome,
};
use famcal_core::config::CalendarConfig;
use famcal_core::domain::event::{CalendarEvent, EventId, EventTiming, SeriesId};
use famcal_core::domain::intent::Recurrence;
use famcal_core::time::{self, recurrence};

use crate::retry::{send_with_retry, RetryPolicy};
use crate::wire::{EventList, EventWrite, GoogleEventRaw};

const PAGE_SIZE: &str = "250";

/// Shared family calendar on Google Calendar v3, authenticated with a bearer token.
pub struct GoogleCalendar {
    client: Client,
    base_url: String,
    calendar_id: String,
    access_token: SecretString,
    tz: Tz,
    retry: RetryPolicy,
}

impl GoogleCalendar {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        calendar_id: impl Into<String>,
        access_token: SecretString,
        tz: Tz,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            calendar_id: calendar_id.into(),
            access_token,
            tz,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let tz = config.tz()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| CalendarError::Api(format!("http client: {error}")))?;

        Ok(Self::new(
            client,
            config.api_base_url.clone(),
            config.calendar_id.clone(),
            config.access_token.clone(),
            tz,
        ))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, trailing: &[&str]) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.base_url).map_err(|error| {
            CalendarError::Api(format!("invalid calendar base url `{}`: {error}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| CalendarError::Api("calendar base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["calendars", self.calendar_id.as_str(), "events"])
            .extend(trailing);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.access_token.expose_secret())
    }

    /// Sends `request`. Only reads are retried; every write goes out exactly once.
    async fn send(&self, request: RequestBuilder, read: bool) -> Result<Response, CalendarError> {
        let single = RetryPolicy::none();
        let policy = if read { &self.retry } else { &single };
        let response = send_with_retry(self.authorized(request), policy)
            .await
            .map_err(|error| CalendarError::Api(format!("transport: {error}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CalendarError::from_status(status.as_u16(), truncate(&body)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        read: bool,
    ) -> Result<T, CalendarError> {
        self.send(request, read)
            .await?
            .json::<T>()
            .await
            .map_err(|error| CalendarError::Api(format!("invalid calendar response: {error}")))
    }

    async fn fetch_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        search: Option<&str>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let url = self.url(&[])?;
        let time_min = time::start_of_day(from, self.tz).to_rfc3339();
        let time_max = time::end_of_day(to, self.tz).to_rfc3339();

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(url.clone()).query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", PAGE_SIZE),
            ]);
            if let Some(search) = search {
                request = request.query(&[("q", search)]);
            }
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: EventList = self.send_json(request, true).await?;
            for item in page.items.into_iter().filter(|item| !item.is_cancelled()) {
                events.push(item.into_event(self.tz)?);
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(events)
    }

    async fn get_raw(&self, event_id: &str) -> Result<GoogleEventRaw, CalendarError> {
        let url = self.url(&[event_id])?;
        self.send_json(self.client.get(url), true).await
    }

    async fn insert(&self, body: &EventWrite) -> Result<CalendarEvent, CalendarError> {
        let url = self.url(&[])?;
        let raw: GoogleEventRaw = self.send_json(self.client.post(url).json(body), false).await?;
        raw.into_event(self.tz)
    }

    async fn patch(
        &self,
        event_id: &str,
        body: &EventWrite,
    ) -> Result<GoogleEventRaw, CalendarError> {
        let url = self.url(&[event_id])?;
        self.send_json(self.client.patch(url).json(body), false).await
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendar {
    fn timezone(&self) -> Tz {
        self.tz
    }

    async fn list(&self, date: NaiveDate) -> Result<Vec<CalendarEvent>, CalendarError> {
        let events = self.fetch_range(date, date, None).await?;
        debug!(
            event_name = "calendar.events_listed",
            calendar_id = %self.calendar_id,
            %date,
            count = events.len(),
            "listed calendar events"
        );
        Ok(events)
    }

    async fn find(&self, query: &EventQuery) -> Result<SearchOutcome, CalendarError> {
        let hint = query.title_hint.as_deref().map(str::trim).filter(|hint| !hint.is_empty());
        let events = self.fetch_range(query.date, query.last_date(), hint).await?;
        let matches =
            events.into_iter().filter(|event| query.matches(event)).collect::<Vec<_>>();

        debug!(
            event_name = "calendar.events_found",
            calendar_id = %self.calendar_id,
            date = %query.date,
            date_end = %query.last_date(),
            count = matches.len(),
            "searched calendar events"
        );
        Ok(SearchOutcome::from_matches(matches))
    }

    async fn create(&self, event: &NewEvent) -> Result<CalendarEvent, CalendarError> {
        let timing = EventTiming::Timed { start: event.start(self.tz), end: event.end(self.tz) };
        let body = EventWrite {
            summary: Some(event.title.clone()),
            description: event.description.clone(),
            ..EventWrite::default()
        }
        .with_timing(&timing);

        let created = self.insert(&body).await?;
        info!(
            event_name = "calendar.event_created",
            calendar_id = %self.calendar_id,
            event_id = %created.id,
            "created calendar event"
        );
        Ok(created)
    }

    async fn create_all_day(
        &self,
        event: &NewAllDayEvent,
    ) -> Result<CalendarEvent, CalendarError> {
        let timing = EventTiming::AllDay {
            start: event.start_date,
            end_exclusive: event.end_date_exclusive,
        };
        let body = EventWrite {
            summary: Some(event.title.clone()),
            description: event.description.clone(),
            ..EventWrite::default()
        }
        .with_timing(&timing);

        let created = self.insert(&body).await?;
        info!(
            event_name = "calendar.all_day_event_created",
            calendar_id = %self.calendar_id,
            event_id = %created.id,
            "created all-day calendar event"
        );
        Ok(created)
    }

    async fn create_recurring(
        &self,
        event: &NewEvent,
        recurrence: &Recurrence,
    ) -> Result<RecurringCreated, CalendarError> {
        let plan = plan_recurring(event, recurrence, self.tz);
        let body = EventWrite {
            summary: Some(event.title.clone()),
            description: event.description.clone(),
            recurrence: Some(vec![plan.rule.clone()]),
            ..EventWrite::default()
        }
        .with_timing(&EventTiming::Timed { start: plan.start, end: plan.end });

        let created = self.insert(&body).await?;
        info!(
            event_name = "calendar.recurring_event_created",
            calendar_id = %self.calendar_id,
            event_id = %created.id,
            rule = %plan.rule,
            "created recurring calendar event"
        );
        Ok(RecurringCreated { event: created, next_occurrences: plan.preview })
    }

    async fn update(
        &self,
        event_id: &EventId,
        changes: &EventChanges,
    ) -> Result<CalendarEvent, CalendarError> {
        let mut body = EventWrite { summary: changes.title.clone(), ..EventWrite::default() };

        if changes.moves_event() {
            let existing = self.get_raw(&event_id.0).await?.into_event(self.tz)?;
            body = body.with_timing(&reschedule(&existing.timing, changes, self.tz));
        }

        let updated = self.patch(&event_id.0, &body).await?.into_event(self.tz)?;
        info!(
            event_name = "calendar.event_updated",
            calendar_id = %self.calendar_id,
            event_id = %updated.id,
            "updated calendar event"
        );
        Ok(updated)
    }

    async fn delete(&self, event_id: &EventId) -> Result<(), CalendarError> {
        let url = self.url(&[event_id.0.as_str()])?;
        self.send(self.client.delete(url), false).await?;
        info!(
            event_name = "calendar.event_deleted",
            calendar_id = %self.calendar_id,
            event_id = %event_id,
            "deleted calendar event"
        );
        Ok(())
    }

    async fn trim_series(
        &self,
        series_id: &SeriesId,
        cutover: NaiveDate,
    ) -> Result<(), CalendarError> {
        let master = self.get_raw(&series_id.0).await?;
        let index = master.rule_index().ok_or_else(|| {
            CalendarError::Api(format!("event `{series_id}` has no recurrence rule"))
        })?;

        let mut lines = master.recurrence;
        lines[index] = recurrence::trim_rule_before(&lines[index], cutover, self.tz)?;

        let body = EventWrite { recurrence: Some(lines), ..EventWrite::default() };
        self.patch(&series_id.0, &body).await?;
        info!(
            event_name = "calendar.series_trimmed",
            calendar_id = %self.calendar_id,
            series_id = %series_id,
            %cutover,
            "trimmed recurring series"
        );
        Ok(())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
