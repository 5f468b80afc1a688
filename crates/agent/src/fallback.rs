//! Human-handoff detection.

use crate::memory::{Sentiment, SessionContext};
use booking_agent_config::DetectionSettings;
use booking_agent_core::SlotSet;

const HANDOFF_MESSAGE: &str = "I want to make sure you get the help you need, so I'm passing you to one of our team members. They'll pick up this conversation right here in just a moment.";

pub struct FallbackDetector {
    settings: DetectionSettings,
}

impl FallbackDetector {
    pub fn new(settings: DetectionSettings) -> Self {
        Self { settings }
    }

    /// Returns the fixed redirect message when the conversation should be
    /// handed to a human: too many degraded turns, negative sentiment, or
    /// a long conversation that never even captured a name.
    pub fn check(&self, context: &SessionContext, slots: &SlotSet) -> Option<&'static str> {
        if context.fallback_count >= self.settings.max_fallbacks {
            tracing::info!(
                fallback_count = context.fallback_count,
                "handoff: repeated degraded turns"
            );
            return Some(HANDOFF_MESSAGE);
        }
        if context.sentiment == Sentiment::Negative {
            tracing::info!("handoff: negative sentiment");
            return Some(HANDOFF_MESSAGE);
        }
        if context.message_count > self.settings.max_messages_without_name && slots.name.is_none() {
            tracing::info!(
                message_count = context.message_count,
                "handoff: long conversation without identification"
            );
            return Some(HANDOFF_MESSAGE);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> FallbackDetector {
        FallbackDetector::new(DetectionSettings::default())
    }

    #[test]
    fn repeated_fallbacks_trigger_handoff() {
        let context = SessionContext {
            fallback_count: 3,
            ..Default::default()
        };
        assert!(detector().check(&context, &SlotSet::default()).is_some());
    }

    #[test]
    fn negative_sentiment_triggers_handoff() {
        let context = SessionContext {
            sentiment: Sentiment::Negative,
            ..Default::default()
        };
        assert!(detector().check(&context, &SlotSet::default()).is_some());
    }

    #[test]
    fn long_anonymous_conversation_triggers_handoff() {
        let context = SessionContext {
            message_count: 11,
            ..Default::default()
        };
        assert!(detector().check(&context, &SlotSet::default()).is_some());

        let named = SlotSet {
            name: Some("Alice".into()),
            ..Default::default()
        };
        assert!(detector().check(&context, &named).is_none());
    }

    #[test]
    fn healthy_conversation_stays_with_the_agent() {
        let context = SessionContext {
            message_count: 4,
            fallback_count: 1,
            sentiment: Sentiment::Positive,
            ..Default::default()
        };
        assert!(detector().check(&context, &SlotSet::default()).is_none());
    }
}
