//! Scenario detection.
//!
//! A pure classification over session state and the current extraction.
//! First matching rule wins; the keyword tables make explicit confirmation
//! and denial cheap to detect without the LLM.

use booking_agent_config::DetectionSettings;
use booking_agent_core::{Scenario, SlotSet};
use once_cell::sync::Lazy;

/// Affirmative phrases. Single words match on token boundaries, phrases by
/// substring.
static AFFIRMATIVE: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "yes",
        "yep",
        "yeah",
        "confirm",
        "confirmed",
        "correct",
        "exactly",
        "ok",
        "okay",
        "sure",
        "perfect",
        "go ahead",
        "sounds good",
        "that's right",
        "thats right",
        "book it",
        "all good",
    ]
});

/// Negation and correction phrases. A denial cancels an affirmative in the
/// same message ("yes but change the date" is not a confirmation).
static NEGATION: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "no",
        "nope",
        "wrong",
        "incorrect",
        "change",
        "switch",
        "cancel",
        "not right",
        "not correct",
    ]
});

fn matches_keyword(message: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return message.contains(keyword);
    }
    message
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|token| token == keyword)
}

fn contains_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| matches_keyword(message, k))
}

/// True when the message affirms without also correcting.
pub fn is_explicit_confirmation(message: &str) -> bool {
    let lowered = message.to_lowercase();
    contains_any(&lowered, &AFFIRMATIVE) && !contains_any(&lowered, &NEGATION)
}

pub fn is_explicit_denial(message: &str) -> bool {
    contains_any(&message.to_lowercase(), &NEGATION)
}

/// Everything the detector looks at for one turn.
#[derive(Debug, Clone)]
pub struct ScenarioInputs<'a> {
    pub message: &'a str,
    /// User messages seen so far, including this one.
    pub message_count: usize,
    /// Slot state after this turn's merge.
    pub slots: &'a SlotSet,
    pub confidence: f32,
    pub faq_found: bool,
}

/// Decision order, first match wins:
/// 1. full slots and (confident or explicitly confirming) -> scheduling on
///    explicit confirmation, otherwise confirmation
/// 2. FAQ matches at low confidence -> faq
/// 3. first two turns, nothing captured, low confidence -> greeting
/// 4. first three turns at high confidence -> initial-message
/// 5. otherwise -> data-collection
pub fn detect_scenario(inputs: &ScenarioInputs<'_>, settings: &DetectionSettings) -> Scenario {
    let confirming = is_explicit_confirmation(inputs.message);
    let confident = inputs.confidence > settings.high_confidence;

    if inputs.slots.booking_complete() && (confident || confirming) {
        return if confirming {
            Scenario::Scheduling
        } else {
            Scenario::Confirmation
        };
    }

    if inputs.faq_found && inputs.confidence < settings.high_confidence {
        return Scenario::Faq;
    }

    if inputs.message_count <= 2
        && inputs.slots.name.is_none()
        && inputs.slots.procedure.is_none()
        && inputs.confidence < settings.high_confidence
    {
        return Scenario::Greeting;
    }

    if inputs.message_count <= 3 && inputs.confidence >= settings.high_confidence {
        return Scenario::InitialMessage;
    }

    Scenario::DataCollection
}
