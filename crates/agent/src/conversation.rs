use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use famcal_core::domain::conversation::HistoryTurn;
use famcal_core::domain::intent::{CalendarEntities, Frequency, Intent, IntentKind, Recurrence};
use famcal_core::time::recurrence::parse_weekday_code;

use crate::llm::{LlmClient, LlmError, ToolCallRequest};
use crate::prompts::{build_messages, CALENDAR_SYSTEM_PROMPT};
use crate::tools::calendar_intent_tool;

#[derive(Debug, Error)]
pub enum IntentExtractionError {
    #[error("intent extraction failed: {0}")]
    Llm(#[from] LlmError),
    #[error("intent payload rejected: {0}")]
    Schema(String),
}

/// Turns chat text into a validated [`Intent`] through one forced tool call.
#[derive(Clone)]
pub struct IntentExtractor {
    llm: Arc<dyn LlmClient>,
    max_history: usize,
}

impl IntentExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, max_history: usize) -> Self {
        Self { llm, max_history }
    }

    pub async fn extract(
        &self,
        text: &str,
        history: &[HistoryTurn],
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Intent, IntentExtractionError> {
        let request = ToolCallRequest {
            system: CALENDAR_SYSTEM_PROMPT.to_string(),
            messages: build_messages(history, text, now, tz, self.max_history),
            tool: calendar_intent_tool(),
        };

        let call = self.llm.call_tool(&request).await?;
        let raw = serde_json::from_value::<RawIntent>(call.input).map_err(|error| {
            IntentExtractionError::Schema(format!("tool input does not match schema: {error}"))
        })?;

        let intent = match Intent::try_from(raw) {
            Ok(intent) => intent,
            Err(error) => {
                warn!(event_name = "agent.intent_rejected", error = %error, "intent rejected");
                return Err(error);
            }
        };

        debug!(
            event_name = "agent.intent_extracted",
            intent = intent.kind.as_str(),
            confidence = intent.confidence,
            has_clarification = intent.clarification_text().is_some(),
            "intent extracted"
        );
        Ok(intent)
    }
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    intent: String,
    #[serde(default)]
    entities: RawEntities,
    confidence: f64,
    #[serde(default)]
    clarification_needed: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntities {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    date_end: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    duration_minutes: Option<f64>,
    #[serde(default)]
    all_day: Option<bool>,
    #[serde(default)]
    recurrence: Option<RawRecurrence>,
    #[serde(default)]
    event_search_query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecurrence {
    frequency: String,
    #[serde(default)]
    day_of_week: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

impl TryFrom<RawIntent> for Intent {
    type Error = IntentExtractionError;

    fn try_from(raw: RawIntent) -> Result<Self, Self::Error> {
        let kind = IntentKind::parse(raw.intent.trim())
            .ok_or_else(|| schema(format!("unknown intent `{}`", raw.intent)))?;

        if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
            return Err(schema(format!("confidence {} is outside [0, 1]", raw.confidence)));
        }

        Ok(Self {
            kind,
            entities: CalendarEntities::try_from(raw.entities)?,
            confidence: raw.confidence,
            clarification: non_blank(raw.clarification_needed),
        })
    }
}

impl TryFrom<RawEntities> for CalendarEntities {
    type Error = IntentExtractionError;

    fn try_from(raw: RawEntities) -> Result<Self, Self::Error> {
        let duration_minutes = match raw.duration_minutes {
            None => None,
            Some(minutes)
                if minutes.fract() == 0.0 && minutes >= 1.0 && minutes <= f64::from(u32::MAX) =>
            {
                Some(minutes as u32)
            }
            Some(minutes) => {
                return Err(schema(format!("duration_minutes {minutes} is not a positive integer")))
            }
        };

        Ok(Self {
            title: non_blank(raw.title),
            date: parse_date("date", raw.date)?,
            date_end: parse_date("date_end", raw.date_end)?,
            time: parse_time("time", raw.time)?,
            end_time: parse_time("end_time", raw.end_time)?,
            duration_minutes,
            recurrence: raw.recurrence.map(Recurrence::try_from).transpose()?,
            all_day: raw.all_day.unwrap_or(false),
            event_search_query: non_blank(raw.event_search_query),
        })
    }
}

impl TryFrom<RawRecurrence> for Recurrence {
    type Error = IntentExtractionError;

    fn try_from(raw: RawRecurrence) -> Result<Self, Self::Error> {
        let frequency = Frequency::parse(raw.frequency.trim().to_ascii_uppercase().as_str())
            .ok_or_else(|| schema(format!("unknown frequency `{}`", raw.frequency)))?;

        let day_of_week = match non_blank(raw.day_of_week) {
            Some(code) => Some(
                parse_weekday_code(&code.to_ascii_uppercase())
                    .ok_or_else(|| schema(format!("unknown day_of_week `{code}`")))?,
            ),
            None => None,
        };

        Ok(Self { frequency, day_of_week, end_date: parse_date("end_date", raw.end_date)? })
    }
}

fn schema(message: String) -> IntentExtractionError {
    IntentExtractionError::Schema(message)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_date(
    field: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, IntentExtractionError> {
    non_blank(value)
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|_| schema(format!("{field} `{raw}` is not YYYY-MM-DD")))
        })
        .transpose()
}

fn parse_time(
    field: &str,
    value: Option<String>,
) -> Result<Option<NaiveTime>, IntentExtractionError> {
    non_blank(value)
        .map(|raw| {
            NaiveTime::parse_from_str(&raw, "%H:%M")
                .map_err(|_| schema(format!("{field} `{raw}` is not HH:MM")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
    use chrono_tz::Europe::Berlin;
    use serde_json::json;

    use famcal_core::domain::conversation::HistoryTurn;
    use famcal_core::domain::intent::{Frequency, IntentKind};

    use super::{IntentExtractionError, IntentExtractor};
    use crate::llm::{LlmError, ProviderErrorKind, ScriptedLlmClient};

    fn extractor(llm: Arc<ScriptedLlmClient>) -> IntentExtractor {
        IntentExtractor::new(llm, 5)
    }

    fn create_with(entities: serde_json::Value) -> serde_json::Value {
        json!({"intent": "create_event", "entities": entities, "confidence": 0.9})
    }

    #[tokio::test]
    async fn valid_tool_input_becomes_typed_intent() {
        let llm = Arc::new(ScriptedLlmClient::default());
        llm.push_input(json!({
            "intent": "create_event",
            "entities": {
                "title": "Schwimmen",
                "time": "17:00",
                "duration_minutes": 90,
                "recurrence": {"frequency": "WEEKLY", "day_of_week": "TU", "end_date": "2026-06-30"}
            },
            "confidence": 0.9
        }))
        .await;

        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).single().expect("valid timestamp");
        let intent = extractor(llm.clone())
            .extract("Jeden Dienstag 17 Uhr Schwimmen", &[], now, Berlin)
            .await
            .expect("extract intent");

        assert_eq!(intent.kind, IntentKind::CreateEvent);
        assert_eq!(intent.entities.time, NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(intent.entities.duration_minutes, Some(90));
        let recurrence = intent.entities.recurrence.expect("recurrence");
        assert_eq!(recurrence.frequency, Frequency::Weekly);
        assert_eq!(recurrence.day_of_week, Some(Weekday::Tue));
        assert_eq!(recurrence.end_date, NaiveDate::from_ymd_opt(2026, 6, 30));

        let requests = llm.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool.name, "parse_calendar_intent");
    }

    #[tokio::test]
    async fn history_is_bounded_before_the_newest_message() {
        let llm = Arc::new(ScriptedLlmClient::default());
        llm.push_input(json!({"intent": "greeting", "entities": {}, "confidence": 1.0})).await;

        let history = (0..8)
            .map(|index| {
                if index % 2 == 0 {
                    HistoryTurn::user(format!("u{index}"))
                } else {
                    HistoryTurn::assistant(format!("a{index}"))
                }
            })
            .collect::<Vec<_>>();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).single().expect("valid timestamp");

        extractor(llm.clone()).extract("Hallo", &history, now, Berlin).await.expect("extract");

        let messages = &llm.requests().await[0].messages;
        assert_eq!(messages.first().map(|turn| turn.content.as_str()), Some("u4"));
        assert_eq!(messages.len(), 5);
    }

    #[tokio::test]
    async fn schema_violations_are_hard_failures() {
        let cases = [
            json!({"intent": "book_flight", "entities": {}, "confidence": 0.9}),
            json!({"intent": "create_event", "entities": {}, "confidence": 1.5}),
            create_with(json!({"date": "09.03.2026"})),
            create_with(json!({"time": "10 Uhr"})),
            create_with(json!({"duration_minutes": 0})),
            create_with(json!({"duration_minutes": 7.5})),
            create_with(json!({"recurrence": {"frequency": "WEEKLY", "day_of_week": "MONTAG"}})),
            json!({
                "intent": "create_event",
                "entities": {"recurrence": {"frequency": "YEARLY"}},
                "confidence": 0.9
            }),
            json!({"entities": {}, "confidence": 0.9}),
        ];
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).single().expect("valid timestamp");

        for input in cases {
            let llm = Arc::new(ScriptedLlmClient::default());
            llm.push_input(input.clone()).await;

            let result = extractor(llm).extract("x", &[], now, Berlin).await;
            assert!(
                matches!(result, Err(IntentExtractionError::Schema(_))),
                "expected schema failure for {input}"
            );
        }
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_llm_error() {
        let llm = Arc::new(ScriptedLlmClient::default());
        llm.push_error(LlmError::Status {
            status: 529,
            kind: ProviderErrorKind::ServerError,
            message: "overloaded".to_string(),
        })
        .await;
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).single().expect("valid timestamp");

        let result = extractor(llm).extract("Hallo", &[], now, Berlin).await;
        assert!(matches!(result, Err(IntentExtractionError::Llm(LlmError::Status { .. }))));
    }

    #[tokio::test]
    async fn blank_strings_are_treated_as_absent() {
        let llm = Arc::new(ScriptedLlmClient::default());
        llm.push_input(json!({
            "intent": "query_events",
            "entities": {"title": " ", "date": "", "event_search_query": ""},
            "confidence": 0.8,
            "clarification_needed": ""
        }))
        .await;
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).single().expect("valid timestamp");

        let intent = extractor(llm).extract("Was steht an?", &[], now, Berlin).await.expect("ok");

        assert_eq!(intent.entities.title, None);
        assert_eq!(intent.entities.date, None);
        assert_eq!(intent.clarification, None);
    }
}
