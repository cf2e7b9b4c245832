use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;

use super::{
    plan_recurring, reschedule, CalendarError, CalendarGateway, EventChanges, EventQuery,
    NewAllDayEvent, NewEvent, RecurringCreated, SearchOutcome,
};
use crate::domain::event::{CalendarEvent, EventId, EventTiming, SeriesId};
use crate::domain::intent::{Frequency, Recurrence};
use crate::time::{self, recurrence};

/// Upper bound on occurrences walked while expanding a series.
const MAX_EXPANSION: usize = 3_700;

#[derive(Clone, Debug)]
struct Series {
    frequency: Frequency,
    rule: String,
    until: Option<DateTime<Utc>>,
    skipped: BTreeSet<NaiveDate>,
}

#[derive(Clone, Debug)]
struct StoredEvent {
    title: String,
    timing: EventTiming,
    description: Option<String>,
    series: Option<Series>,
    /// Set for detached instances that were edited individually.
    parent: Option<SeriesId>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    events: BTreeMap<String, StoredEvent>,
    failure: Option<CalendarError>,
    deleted: Vec<EventId>,
}

/// Calendar held in process memory. Expands recurring series the same way the
/// hosted backend does (instance ids `<series>_<yyyymmdd>`), so it backs unit
/// tests and local dry runs.
pub struct InMemoryCalendar {
    tz: Tz,
    state: RwLock<State>,
}

impl InMemoryCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz, state: RwLock::new(State::default()) }
    }

    /// Makes the next gateway call fail with `error`.
    pub async fn fail_next(&self, error: CalendarError) {
        self.state.write().await.failure = Some(error);
    }

    pub async fn deleted_ids(&self) -> Vec<EventId> {
        self.state.read().await.deleted.clone()
    }

    pub async fn stored_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn rule_of(&self, series_id: &SeriesId) -> Option<String> {
        let state = self.state.read().await;
        state.events.get(&series_id.0)?.series.as_ref().map(|series| series.rule.clone())
    }

    async fn take_failure(&self) -> Result<(), CalendarError> {
        match self.state.write().await.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn events_on(&self, state: &State, date: NaiveDate) -> Vec<CalendarEvent> {
        let mut events = Vec::new();

        for (id, stored) in &state.events {
            match &stored.series {
                None => {
                    if covers(&stored.timing, date) {
                        events.push(snapshot(id, stored, stored.parent.clone()));
                    }
                }
                Some(series) => {
                    if let Some(instance) = self.instance_on(id, stored, series, date) {
                        events.push(instance);
                    }
                }
            }
        }

        events.sort_by_key(sort_key);
        events
    }

    fn instance_on(
        &self,
        id: &str,
        stored: &StoredEvent,
        series: &Series,
        date: NaiveDate,
    ) -> Option<CalendarEvent> {
        let EventTiming::Timed { start, end } = &stored.timing else {
            return None;
        };
        if date < start.date_naive() || series.skipped.contains(&date) {
            return None;
        }

        let minutes = (*end - *start).num_minutes();
        // Every frequency advances at least one day per step.
        let span = usize::try_from((date - start.date_naive()).num_days()).unwrap_or(0) + 1;
        let steps = span.min(MAX_EXPANSION);
        let occurrence = recurrence::next_occurrences(*start, series.frequency, steps)
            .into_iter()
            .take_while(|occurrence| occurrence.date_naive() <= date)
            .find(|occurrence| occurrence.date_naive() == date)?;

        if series.until.is_some_and(|until| occurrence.with_timezone(&Utc) > until) {
            return None;
        }

        Some(CalendarEvent {
            id: instance_id(id, date),
            title: stored.title.clone(),
            timing: EventTiming::Timed {
                start: occurrence,
                end: time::add_duration(occurrence, minutes),
            },
            description: stored.description.clone(),
            series_id: Some(SeriesId(id.to_owned())),
        })
    }

    fn insert(&self, state: &mut State, stored: StoredEvent) -> String {
        state.next_id += 1;
        let id = format!("evt{}", state.next_id);
        state.events.insert(id.clone(), stored);
        id
    }
}

#[async_trait]
impl CalendarGateway for InMemoryCalendar {
    fn timezone(&self) -> Tz {
        self.tz
    }

    async fn list(&self, date: NaiveDate) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.take_failure().await?;
        let state = self.state.read().await;
        Ok(self.events_on(&state, date))
    }

    async fn find(&self, query: &EventQuery) -> Result<SearchOutcome, CalendarError> {
        self.take_failure().await?;
        let state = self.state.read().await;

        let mut matches = Vec::new();
        let mut day = query.date;
        while day <= query.last_date() {
            matches.extend(self.events_on(&state, day).into_iter().filter(|e| query.matches(e)));
            let Some(next) = day.checked_add_days(Days::new(1)) else {
                break;
            };
            day = next;
        }

        Ok(SearchOutcome::from_matches(matches))
    }

    async fn create(&self, event: &NewEvent) -> Result<CalendarEvent, CalendarError> {
        self.take_failure().await?;
        let mut state = self.state.write().await;

        let stored = StoredEvent {
            title: event.title.clone(),
            timing: EventTiming::Timed { start: event.start(self.tz), end: event.end(self.tz) },
            description: event.description.clone(),
            series: None,
            parent: None,
        };
        let id = self.insert(&mut state, stored.clone());
        Ok(snapshot(&id, &stored, None))
    }

    async fn create_all_day(
        &self,
        event: &NewAllDayEvent,
    ) -> Result<CalendarEvent, CalendarError> {
        self.take_failure().await?;
        let mut state = self.state.write().await;

        let stored = StoredEvent {
            title: event.title.clone(),
            timing: EventTiming::AllDay {
                start: event.start_date,
                end_exclusive: event.end_date_exclusive,
            },
            description: event.description.clone(),
            series: None,
            parent: None,
        };
        let id = self.insert(&mut state, stored.clone());
        Ok(snapshot(&id, &stored, None))
    }

    async fn create_recurring(
        &self,
        event: &NewEvent,
        recurrence: &Recurrence,
    ) -> Result<RecurringCreated, CalendarError> {
        self.take_failure().await?;
        let mut state = self.state.write().await;

        let plan = plan_recurring(event, recurrence, self.tz);
        let stored = StoredEvent {
            title: event.title.clone(),
            timing: EventTiming::Timed { start: plan.start, end: plan.end },
            description: event.description.clone(),
            series: Some(Series {
                frequency: recurrence.frequency,
                rule: plan.rule,
                until: recurrence
                    .end_date
                    .map(|date| time::end_of_day(date, self.tz).with_timezone(&Utc)),
                skipped: BTreeSet::new(),
            }),
            parent: None,
        };
        let id = self.insert(&mut state, stored.clone());

        Ok(RecurringCreated { event: snapshot(&id, &stored, None), next_occurrences: plan.preview })
    }

    async fn update(
        &self,
        event_id: &EventId,
        changes: &EventChanges,
    ) -> Result<CalendarEvent, CalendarError> {
        self.take_failure().await?;
        let mut state = self.state.write().await;

        if let Some((series_id, date)) = split_instance_id(&event_id.0) {
            // Editing one occurrence detaches it from its series.
            let instance = {
                let master = state.events.get(series_id).ok_or(CalendarError::NotFound)?;
                let series = master.series.as_ref().ok_or(CalendarError::NotFound)?;
                self.instance_on(series_id, master, series, date).ok_or(CalendarError::NotFound)?
            };
            if let Some(series) =
                state.events.get_mut(series_id).and_then(|master| master.series.as_mut())
            {
                series.skipped.insert(date);
            }

            let stored = StoredEvent {
                title: changes.title.clone().unwrap_or(instance.title),
                timing: reschedule(&instance.timing, changes, self.tz),
                description: instance.description,
                series: None,
                parent: instance.series_id,
            };
            let id = self.insert(&mut state, stored.clone());
            return Ok(snapshot(&id, &stored, stored.parent.clone()));
        }

        let stored = state.events.get_mut(&event_id.0).ok_or(CalendarError::NotFound)?;
        if let Some(title) = &changes.title {
            stored.title = title.clone();
        }
        stored.timing = reschedule(&stored.timing, changes, self.tz);
        Ok(snapshot(&event_id.0, stored, stored.parent.clone()))
    }

    async fn delete(&self, event_id: &EventId) -> Result<(), CalendarError> {
        self.take_failure().await?;
        let mut state = self.state.write().await;

        if let Some((series_id, date)) = split_instance_id(&event_id.0) {
            let series = state
                .events
                .get_mut(series_id)
                .and_then(|master| master.series.as_mut())
                .ok_or(CalendarError::NotFound)?;
            if !series.skipped.insert(date) {
                return Err(CalendarError::NotFound);
            }
        } else if state.events.remove(&event_id.0).is_none() {
            return Err(CalendarError::NotFound);
        }

        state.deleted.push(event_id.clone());
        Ok(())
    }

    async fn trim_series(
        &self,
        series_id: &SeriesId,
        cutover: NaiveDate,
    ) -> Result<(), CalendarError> {
        self.take_failure().await?;
        let mut state = self.state.write().await;

        let stored = state.events.get_mut(&series_id.0).ok_or(CalendarError::NotFound)?;
        let series = stored
            .series
            .as_mut()
            .ok_or_else(|| CalendarError::Api(format!("event {series_id} has no recurrence")))?;

        series.rule = recurrence::trim_rule_before(&series.rule, cutover, self.tz)?;
        let last_day = cutover.pred_opt().unwrap_or(cutover);
        series.until = Some(time::end_of_day(last_day, self.tz).with_timezone(&Utc));
        Ok(())
    }
}

fn snapshot(id: &str, stored: &StoredEvent, series_id: Option<SeriesId>) -> CalendarEvent {
    CalendarEvent {
        id: EventId(id.to_owned()),
        title: stored.title.clone(),
        timing: stored.timing.clone(),
        description: stored.description.clone(),
        series_id,
    }
}

fn covers(timing: &EventTiming, date: NaiveDate) -> bool {
    match timing {
        EventTiming::Timed { start, .. } => start.date_naive() == date,
        EventTiming::AllDay { start, end_exclusive } => *start <= date && date < *end_exclusive,
    }
}

fn sort_key(event: &CalendarEvent) -> (bool, Option<DateTime<Utc>>, String) {
    match &event.timing {
        EventTiming::AllDay { .. } => (false, None, event.title.clone()),
        EventTiming::Timed { start, .. } => {
            (true, Some(start.with_timezone(&Utc)), event.title.clone())
        }
    }
}

fn instance_id(series_id: &str, date: NaiveDate) -> EventId {
    EventId(format!("{series_id}_{}", date.format("%Y%m%d")))
}

fn split_instance_id(id: &str) -> Option<(&str, NaiveDate)> {
    let (series_id, stamp) = id.rsplit_once('_')?;
    let date = NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()?;
    Some((series_id, date))
}
