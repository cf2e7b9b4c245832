use famcal_core::domain::intent::{Intent, IntentKind};

use crate::replies;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Clarify { reason_code: &'static str, user_message: String },
}

/// Stops uncertain calendar intents before anything touches the calendar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClarificationGuard;

impl ClarificationGuard {
    pub fn evaluate(&self, intent: &Intent) -> GuardrailDecision {
        if !intent.kind.touches_calendar() && intent.kind != IntentKind::Unclear {
            return GuardrailDecision::Allow;
        }

        let reason_code = if let Some(text) = intent.clarification_text() {
            return GuardrailDecision::Clarify {
                reason_code: "clarification_requested",
                user_message: text.to_string(),
            };
        } else if !intent.is_confident() {
            "low_confidence"
        } else if intent.kind == IntentKind::Unclear {
            "unclear_intent"
        } else {
            return GuardrailDecision::Allow;
        };

        GuardrailDecision::Clarify { reason_code, user_message: fallback(intent.kind).to_string() }
    }

    pub fn requires_clarification(&self, intent: &Intent) -> Option<String> {
        match self.evaluate(intent) {
            GuardrailDecision::Allow => None,
            GuardrailDecision::Clarify { user_message, .. } => Some(user_message),
        }
    }
}

fn fallback(kind: IntentKind) -> &'static str {
    match kind {
        IntentKind::UpdateEvent => replies::UPDATE_FALLBACK,
        IntentKind::DeleteEvent => replies::DELETE_FALLBACK,
        _ => replies::GENERIC_FALLBACK,
    }
}

#[cfg(test)]
mod tests {
    use famcal_core::domain::intent::{CalendarEntities, Intent, IntentKind};

    use super::{ClarificationGuard, GuardrailDecision};
    use crate::replies;

    fn intent(kind: IntentKind, confidence: f64, clarification: Option<&str>) -> Intent {
        Intent {
            kind,
            entities: CalendarEntities::default(),
            confidence,
            clarification: clarification.map(str::to_string),
        }
    }

    #[test]
    fn confident_calendar_intent_is_allowed() {
        let guard = ClarificationGuard;
        let decision = guard.evaluate(&intent(IntentKind::CreateEvent, 0.7, None));
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn explicit_clarification_wins_even_when_confident() {
        let guard = ClarificationGuard;
        let decision = guard.evaluate(&intent(
            IntentKind::CreateEvent,
            0.95,
            Some("Für welchen Tag soll ich das eintragen?"),
        ));

        assert_eq!(
            decision,
            GuardrailDecision::Clarify {
                reason_code: "clarification_requested",
                user_message: "Für welchen Tag soll ich das eintragen?".to_string(),
            }
        );
    }

    #[test]
    fn low_confidence_without_text_uses_kind_specific_fallback() {
        let guard = ClarificationGuard;

        assert_eq!(
            guard.requires_clarification(&intent(IntentKind::DeleteEvent, 0.5, None)),
            Some(replies::DELETE_FALLBACK.to_string())
        );
        assert_eq!(
            guard.requires_clarification(&intent(IntentKind::QueryEvents, 0.69, None)),
            Some(replies::GENERIC_FALLBACK.to_string())
        );
        assert_eq!(
            guard.requires_clarification(&intent(IntentKind::Unclear, 0.9, None)),
            Some(replies::GENERIC_FALLBACK.to_string())
        );
    }

    #[test]
    fn reason_codes_name_why_the_guard_fired() {
        let guard = ClarificationGuard;
        let reason = |kind, confidence| match guard.evaluate(&intent(kind, confidence, None)) {
            GuardrailDecision::Clarify { reason_code, .. } => Some(reason_code),
            GuardrailDecision::Allow => None,
        };

        assert_eq!(reason(IntentKind::UpdateEvent, 0.4), Some("low_confidence"));
        assert_eq!(reason(IntentKind::Unclear, 0.9), Some("unclear_intent"));
        assert_eq!(reason(IntentKind::DeleteEvent, 0.9), None);
    }

    #[test]
    fn greetings_bypass_the_guard() {
        let guard = ClarificationGuard;
        assert_eq!(guard.requires_clarification(&intent(IntentKind::Greeting, 0.2, None)), None);
        assert_eq!(guard.requires_clarification(&intent(IntentKind::Help, 0.2, None)), None);
    }
}
