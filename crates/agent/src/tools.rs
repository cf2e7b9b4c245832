use serde::Serialize;
use serde_json::{json, Value};

use famcal_core::domain::intent::IntentKind;

pub const CALENDAR_INTENT_TOOL: &str = "parse_calendar_intent";

/// A tool offered to the model, serialized in the provider's tool format.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn calendar_intent_tool() -> ToolDefinition {
    let intents = IntentKind::ALL.iter().map(IntentKind::as_str).collect::<Vec<_>>();

    ToolDefinition {
        name: CALENDAR_INTENT_TOOL,
        description: "Parse a family member's chat message into a calendar intent with entities",
        input_schema: json!({
            "type": "object",
            "properties": {
                "intent": {
                    "type": "string",
                    "enum": intents,
                    "description": "The primary intent of the message"
                },
                "entities": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "Event title"},
                        "date": {
                            "type": "string",
                            "description": "Event date or range start, YYYY-MM-DD"
                        },
                        "date_end": {
                            "type": "string",
                            "description": "Last day of a range, YYYY-MM-DD (inclusive)"
                        },
                        "time": {"type": "string", "description": "Start time, HH:MM 24h"},
                        "end_time": {"type": "string", "description": "End time, HH:MM 24h"},
                        "duration_minutes": {
                            "type": "integer",
                            "description": "Duration in minutes when no end time is given"
                        },
                        "all_day": {
                            "type": "boolean",
                            "description": "True for all-day or multi-day events"
                        },
                        "recurrence": {
                            "type": "object",
                            "properties": {
                                "frequency": {
                                    "type": "string",
                                    "enum": ["DAILY", "WEEKLY", "MONTHLY"]
                                },
                                "day_of_week": {
                                    "type": "string",
                                    "enum": ["MO", "TU", "WE", "TH", "FR", "SA", "SU"]
                                },
                                "end_date": {
                                    "type": "string",
                                    "description": "Last day of the series, YYYY-MM-DD"
                                }
                            },
                            "required": ["frequency"]
                        },
                        "event_search_query": {
                            "type": "string",
                            "description": "Text identifying the existing event to change or delete"
                        }
                    }
                },
                "confidence": {
                    "type": "number",
                    "description": "Confidence between 0 and 1"
                },
                "clarification_needed": {
                    "type": "string",
                    "description": "Question for the user when details are missing"
                }
            },
            "required": ["intent", "entities", "confidence"]
        }),
    }
}
