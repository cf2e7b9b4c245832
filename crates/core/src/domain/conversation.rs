use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::{EventId, SeriesId};
use crate::domain::intent::Recurrence;

/// Phone number (E.164) or Signal UUID of a chat participant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SenderId(pub String);

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }
}

/// A fully resolved event waiting for the user to confirm a conflict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub title: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub description: Option<String>,
    pub recurrence: Option<Recurrence>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    ConflictConfirmation {
        event: PendingEvent,
    },
    DeleteScope {
        event_id: EventId,
        series_id: SeriesId,
        instance_date: NaiveDate,
        title: String,
    },
}

impl PendingAction {
    pub const CONFLICT_MARKER: &'static str = "awaiting_conflict_confirmation";
    pub const DELETE_SCOPE_MARKER: &'static str = "awaiting_delete_scope";

    pub fn marker(&self) -> &'static str {
        match self {
            Self::ConflictConfirmation { .. } => Self::CONFLICT_MARKER,
            Self::DeleteScope { .. } => Self::DELETE_SCOPE_MARKER,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationState {
    pub sender: SenderId,
    pub pending: Option<PendingAction>,
    pub history: Vec<HistoryTurn>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(sender: SenderId, now: DateTime<Utc>) -> Self {
        Self { sender, pending: None, history: Vec::new(), last_activity_at: now }
    }

    /// Appends a turn and drops the oldest turns beyond `limit`.
    pub fn push_turn(&mut self, turn: HistoryTurn, limit: usize) {
        self.history.push(turn);
        if self.history.len() > limit {
            let overflow = self.history.len() - limit;
            self.history.drain(..overflow);
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.last_activity_at + ttl <= now
    }
}
