use thiserror::Error;

use crate::flows::states::{ConversationPhase, FlowAction, FlowEvent, FlowType, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> ConversationPhase;
    fn transition(
        &self,
        current: &ConversationPhase,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Per-sender dialogue: idle, or waiting on exactly one follow-up answer.
#[derive(Clone, Debug, Default)]
pub struct ConversationFlow;

impl FlowDefinition for ConversationFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::Conversation
    }

    fn initial_state(&self) -> ConversationPhase {
        ConversationPhase::Idle
    }

    fn transition(
        &self,
        current: &ConversationPhase,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_conversation(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> ConversationPhase {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ConversationPhase,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }
}

impl Default for FlowEngine<ConversationFlow> {
    fn default() -> Self {
        Self::new(ConversationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationPhase, event: FlowEvent },
}

fn transition_conversation(
    current: &ConversationPhase,
    event: &FlowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationPhase::{AwaitingConflictConfirmation, AwaitingDeleteScope, Idle};
    use FlowAction::{ClearConversation, PersistPending};
    use FlowEvent::{
        Answered, CommandIssued, ConfirmationAccepted, ConfirmationDeclined, ConflictDetected,
        PendingAborted, PendingRetained, RecurringInstanceSelected, ScopeAllFuture,
        ScopeThisOnly, ScopeUnrecognized,
    };

    let (to, actions) = match (current, event) {
        (_, CommandIssued) => (Idle, vec![ClearConversation]),
        (Idle, Answered) => (Idle, Vec::new()),
        (Idle, ConflictDetected) => (AwaitingConflictConfirmation, vec![PersistPending]),
        (Idle, RecurringInstanceSelected) => (AwaitingDeleteScope, vec![PersistPending]),
        (AwaitingConflictConfirmation, ConfirmationAccepted)
        | (AwaitingConflictConfirmation, ConfirmationDeclined) => (Idle, vec![ClearConversation]),
        (AwaitingDeleteScope, ScopeThisOnly) | (AwaitingDeleteScope, ScopeAllFuture) => {
            (Idle, vec![ClearConversation])
        }
        (AwaitingDeleteScope, ScopeUnrecognized) => (AwaitingDeleteScope, Vec::new()),
        (AwaitingConflictConfirmation, PendingAborted)
        | (AwaitingDeleteScope, PendingAborted) => (Idle, vec![ClearConversation]),
        (AwaitingConflictConfirmation, PendingRetained)
        | (AwaitingDeleteScope, PendingRetained) => (*current, Vec::new()),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

#[cfg(test)]
mod tests {
    use crate::flows::engine::{ConversationFlow, FlowDefinition, FlowEngine, FlowTransitionError};
    use crate::flows::states::{ConversationPhase, FlowAction, FlowEvent, FlowType};

    #[test]
    fn conflict_confirmation_round_trip() {
        let engine = FlowEngine::new(ConversationFlow);
        let state = engine.initial_state();

        let awaiting =
            engine.apply(&state, &FlowEvent::ConflictDetected).expect("idle -> awaiting conflict");
        assert_eq!(awaiting.to, ConversationPhase::AwaitingConflictConfirmation);
        assert_eq!(awaiting.actions, vec![FlowAction::PersistPending]);

        let accepted = engine
            .apply(&awaiting.to, &FlowEvent::ConfirmationAccepted)
            .expect("awaiting conflict -> idle");
        assert_eq!(accepted.to, ConversationPhase::Idle);
        assert!(accepted.clears_conversation());
    }

    #[test]
    fn unrecognized_scope_answer_stays_in_place() {
        let engine = FlowEngine::default();

        let outcome = engine
            .apply(&ConversationPhase::AwaitingDeleteScope, &FlowEvent::ScopeUnrecognized)
            .expect("re-ask");
        assert_eq!(outcome.to, ConversationPhase::AwaitingDeleteScope);
        assert!(outcome.actions.is_empty());

        let trimmed = engine
            .apply(&outcome.to, &FlowEvent::ScopeAllFuture)
            .expect("awaiting scope -> idle");
        assert_eq!(trimmed.to, ConversationPhase::Idle);
    }

    #[test]
    fn commands_reset_every_phase() {
        let engine = FlowEngine::default();

        for phase in [
            ConversationPhase::Idle,
            ConversationPhase::AwaitingConflictConfirmation,
            ConversationPhase::AwaitingDeleteScope,
        ] {
            let outcome = engine.apply(&phase, &FlowEvent::CommandIssued).expect("reset");
            assert_eq!(outcome.to, ConversationPhase::Idle);
            assert!(outcome.clears_conversation());
        }
    }

    #[test]
    fn transient_failure_keeps_pending_question() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&ConversationPhase::AwaitingConflictConfirmation, &FlowEvent::PendingRetained)
            .expect("retain");

        assert_eq!(outcome.to, ConversationPhase::AwaitingConflictConfirmation);
        assert!(!outcome.persists_pending());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&ConversationPhase::Idle, &FlowEvent::ConfirmationAccepted)
            .expect_err("idle has nothing to confirm");

        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                state: ConversationPhase::Idle,
                event: FlowEvent::ConfirmationAccepted,
            }
        );

        let error = engine
            .apply(&ConversationPhase::AwaitingDeleteScope, &FlowEvent::ConfirmationDeclined)
            .expect_err("scope question expects a scope answer");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
        assert_eq!(ConversationFlow.flow_type(), FlowType::Conversation);
    }
}
