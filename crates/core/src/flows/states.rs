use serde::{Deserialize, Serialize};

use crate::domain::conversation::PendingAction;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    Conversation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationPhase {
    Idle,
    AwaitingConflictConfirmation,
    AwaitingDeleteScope,
}

impl ConversationPhase {
    pub fn of(pending: Option<&PendingAction>) -> Self {
        match pending {
            None => Self::Idle,
            Some(PendingAction::ConflictConfirmation { .. }) => Self::AwaitingConflictConfirmation,
            Some(PendingAction::DeleteScope { .. }) => Self::AwaitingDeleteScope,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingConflictConfirmation => PendingAction::CONFLICT_MARKER,
            Self::AwaitingDeleteScope => PendingAction::DELETE_SCOPE_MARKER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    /// A message was answered without opening a follow-up question.
    Answered,
    ConflictDetected,
    RecurringInstanceSelected,
    ConfirmationAccepted,
    ConfirmationDeclined,
    ScopeThisOnly,
    ScopeAllFuture,
    ScopeUnrecognized,
    /// The pending target vanished or became inaccessible.
    PendingAborted,
    /// A transient failure; the same question stays open.
    PendingRetained,
    CommandIssued,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PersistPending,
    ClearConversation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationPhase,
    pub to: ConversationPhase,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn clears_conversation(&self) -> bool {
        self.actions.contains(&FlowAction::ClearConversation)
    }

    pub fn persists_pending(&self) -> bool {
        self.actions.contains(&FlowAction::PersistPending)
    }
}
