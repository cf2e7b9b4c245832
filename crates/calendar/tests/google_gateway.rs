use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use chrono_tz::Europe::Berlin;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use famcal_calendar::{GoogleCalendar, RetryPolicy};
use famcal_core::calendar::{
    CalendarError, CalendarGateway, EventChanges, EventQuery, NewEvent, SearchOutcome,
};
use famcal_core::domain::event::{EventId, SeriesId};
use famcal_core::domain::intent::{Frequency, Recurrence};

const CALENDAR_ID: &str = "family@group.calendar.google.com";

#[derive(Clone, Debug)]
struct Recorded {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
    body: Option<Value>,
}

#[derive(Clone, Default)]
struct MockGoogle {
    responses: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockGoogle {
    async fn respond(&self, status: StatusCode, body: Value) {
        self.responses.lock().await.push_back((status, body));
    }

    async fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().await.clone()
    }
}

async fn handle(
    State(mock): State<MockGoogle>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let parsed = reqwest::Url::parse(&format!("http://mock{uri}")).expect("request uri");
    mock.requests.lock().await.push(Recorded {
        method,
        path: parsed.path().to_string(),
        query: parsed.query_pairs().into_owned().collect(),
        authorization: headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).ok(),
    });

    let (status, body) =
        mock.responses.lock().await.pop_front().unwrap_or((StatusCode::OK, json!({})));
    (status, Json(body))
}

async fn start_mock() -> (MockGoogle, GoogleCalendar) {
    start_mock_with(RetryPolicy::none()).await
}

async fn start_mock_with(retry: RetryPolicy) -> (MockGoogle, GoogleCalendar) {
    let mock = MockGoogle::default();
    let router = Router::new().fallback(handle).with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
    let address = listener.local_addr().expect("mock address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve mock");
    });

    let gateway = GoogleCalendar::new(
        reqwest::Client::new(),
        format!("http://{address}"),
        CALENDAR_ID,
        "test-token".to_string().into(),
        Berlin,
    )
    .with_retry_policy(retry);
    (mock, gateway)
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
}

/// Timed item on 2026-03-02 in Berlin winter time.
fn timed_item(id: &str, title: &str, start: &str, end: &str) -> Value {
    json!({
        "id": id,
        "summary": title,
        "start": {"dateTime": format!("2026-03-02T{start}:00+01:00")},
        "end": {"dateTime": format!("2026-03-02T{end}:00+01:00")},
    })
}

#[tokio::test]
async fn list_follows_pages_and_skips_cancelled_events() {
    let (mock, gateway) = start_mock().await;
    mock.respond(
        StatusCode::OK,
        json!({
            "items": [
                timed_item("a", "Zahnarzt", "10:00", "11:00"),
                {"id": "gone", "status": "cancelled"}
            ],
            "nextPageToken": "p2"
        }),
    )
    .await;
    mock.respond(
        StatusCode::OK,
        json!({"items": [
            timed_item("b", "Training", "17:00", "18:30")
        ]}),
    )
    .await;

    let events = gateway.list(date(2)).await.expect("list events");
    let titles = events.iter().map(|event| event.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Zahnarzt", "Training"]);

    let requests = mock.requests().await;
    assert_eq!(requests.len(), 2);
    let first = &requests[0];
    assert_eq!(first.method, Method::GET);
    assert_eq!(first.path, format!("/calendars/{CALENDAR_ID}/events"));
    assert_eq!(first.authorization.as_deref(), Some("Bearer test-token"));
    assert_eq!(first.query.get("singleEvents").map(String::as_str), Some("true"));
    assert_eq!(first.query.get("orderBy").map(String::as_str), Some("startTime"));
    assert_eq!(
        first.query.get("timeMin").map(String::as_str),
        Some("2026-03-02T00:00:00+01:00")
    );
    assert_eq!(requests[1].query.get("pageToken").map(String::as_str), Some("p2"));
}

#[tokio::test]
async fn find_sends_search_text_and_reports_candidates() {
    let (mock, gateway) = start_mock().await;
    mock.respond(
        StatusCode::OK,
        json!({"items": [
            timed_item("a", "Zahnarzt Lea", "09:00", "10:00"),
            timed_item("b", "Zahnarzt Tom", "11:00", "12:00")
        ]}),
    )
    .await;

    let query =
        EventQuery { date: date(2), date_end: None, title_hint: Some("Zahnarzt".to_string()) };
    let outcome = gateway.find(&query).await.expect("find events");

    let SearchOutcome::Candidates(candidates) = outcome else {
        panic!("expected candidates");
    };
    assert_eq!(candidates[0].id, EventId("a".to_string()));
    assert_eq!(candidates[1].id, EventId("b".to_string()));

    let requests = mock.requests().await;
    assert_eq!(requests[0].query.get("q").map(String::as_str), Some("Zahnarzt"));
}

#[tokio::test]
async fn status_codes_map_to_calendar_errors() {
    let (mock, gateway) = start_mock().await;
    mock.respond(StatusCode::FORBIDDEN, json!({"error": {"message": "forbidden"}})).await;
    mock.respond(StatusCode::NOT_FOUND, json!({"error": {"message": "not found"}})).await;
    mock.respond(StatusCode::TOO_MANY_REQUESTS, json!({})).await;
    mock.respond(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;

    assert_eq!(gateway.list(date(2)).await, Err(CalendarError::PermissionDenied));
    assert_eq!(
        gateway.delete(&EventId("missing".to_string())).await,
        Err(CalendarError::NotFound)
    );
    assert_eq!(gateway.list(date(2)).await, Err(CalendarError::RateLimited));
    assert!(matches!(gateway.list(date(2)).await, Err(CalendarError::Api(_))));
}

#[tokio::test]
async fn recurring_insert_sends_rule_and_aligned_start() {
    let (mock, gateway) = start_mock().await;
    mock.respond(
        StatusCode::OK,
        json!({
            "id": "series1",
            "summary": "Schwimmen",
            "start": {"dateTime": "2026-03-09T17:00:00+01:00", "timeZone": "Europe/Berlin"},
            "end": {"dateTime": "2026-03-09T18:00:00+01:00", "timeZone": "Europe/Berlin"},
            "recurrence": ["RRULE:FREQ=WEEKLY;BYDAY=MO"]
        }),
    )
    .await;

    let event = NewEvent {
        title: "Schwimmen".to_string(),
        date: date(4),
        time: NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
        duration_minutes: 60,
        description: None,
    };
    let recurrence = Recurrence {
        frequency: Frequency::Weekly,
        day_of_week: Some(Weekday::Mon),
        end_date: None,
    };

    let created = gateway.create_recurring(&event, &recurrence).await.expect("create series");
    assert_eq!(created.next_occurrences.len(), 3);
    assert_eq!(created.next_occurrences[0].date_naive(), date(9));
    assert_eq!(created.next_occurrences[0].hour(), 17);

    let requests = mock.requests().await;
    let body = requests[0].body.as_ref().expect("insert body");
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(body["recurrence"], json!(["RRULE:FREQ=WEEKLY;BYDAY=MO"]));
    assert_eq!(body["start"]["dateTime"], "2026-03-09T17:00:00+01:00");
    assert_eq!(body["start"]["timeZone"], "Europe/Berlin");
}

#[tokio::test]
async fn trim_series_patches_until_and_keeps_other_lines() {
    let (mock, gateway) = start_mock().await;
    mock.respond(
        StatusCode::OK,
        json!({
            "id": "series1",
            "summary": "Schwimmen",
            "start": {"dateTime": "2026-03-02T17:00:00+01:00"},
            "end": {"dateTime": "2026-03-02T18:00:00+01:00"},
            "recurrence": [
                "EXDATE;TZID=Europe/Berlin:20260316T170000",
                "RRULE:FREQ=WEEKLY;BYDAY=MO"
            ]
        }),
    )
    .await;
    mock.respond(
        StatusCode::OK,
        json!({
            "id": "series1",
            "start": {"dateTime": "2026-03-02T17:00:00+01:00"},
            "end": {"dateTime": "2026-03-02T18:00:00+01:00"}
        }),
    )
    .await;

    gateway.trim_series(&SeriesId("series1".to_string()), date(23)).await.expect("trim series");

    let requests = mock.requests().await;
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[1].method, Method::PATCH);
    assert_eq!(requests[1].path, format!("/calendars/{CALENDAR_ID}/events/series1"));
    assert_eq!(
        requests[1].body.as_ref().expect("patch body")["recurrence"],
        json!([
            "EXDATE;TZID=Europe/Berlin:20260316T170000",
            "RRULE:FREQ=WEEKLY;BYDAY=MO;UNTIL=20260322T225959Z"
        ])
    );
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, initial_backoff_ms: 5, max_backoff_ms: 5 }
}

#[tokio::test]
async fn reads_are_retried_after_transient_failures() {
    let (mock, gateway) = start_mock_with(fast_retry()).await;
    mock.respond(StatusCode::SERVICE_UNAVAILABLE, json!({})).await;
    mock.respond(
        StatusCode::OK,
        json!({"items": [timed_item("a", "Zahnarzt", "10:00", "11:00")]}),
    )
    .await;

    let events = gateway.list(date(2)).await.expect("list after retry");

    assert_eq!(events.len(), 1);
    assert_eq!(mock.requests().await.len(), 2);
}

#[tokio::test]
async fn failed_insert_is_not_resent() {
    let (mock, gateway) = start_mock_with(fast_retry()).await;
    mock.respond(StatusCode::SERVICE_UNAVAILABLE, json!({})).await;
    mock.respond(
        StatusCode::OK,
        json!({
            "id": "dup",
            "summary": "Zahnarzt",
            "start": {"dateTime": "2026-03-09T10:00:00+01:00"},
            "end": {"dateTime": "2026-03-09T11:00:00+01:00"}
        }),
    )
    .await;

    let event = NewEvent {
        title: "Zahnarzt".to_string(),
        date: date(9),
        time: NaiveTime::from_hms_opt(10, 0, 0).expect("valid time"),
        duration_minutes: 60,
        description: None,
    };
    let result = gateway.create(&event).await;

    assert!(matches!(result, Err(CalendarError::Api(_))));
    let inserts = mock
        .requests()
        .await
        .into_iter()
        .filter(|request| request.method == Method::POST)
        .count();
    assert_eq!(inserts, 1);
}

#[tokio::test]
async fn failed_patch_is_not_resent() {
    let (mock, gateway) = start_mock_with(fast_retry()).await;
    mock.respond(StatusCode::BAD_GATEWAY, json!({})).await;

    let changes = EventChanges { title: Some("Kontrolle".to_string()), ..Default::default() };
    let result = gateway.update(&EventId("a".to_string()), &changes).await;

    assert!(matches!(result, Err(CalendarError::Api(_))));
    assert_eq!(mock.requests().await.len(), 1);
}
