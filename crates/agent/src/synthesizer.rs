//! Response synthesis from executed function results.
//!
//! Priority chain: invalid reference data, direct listings, unavailable
//! slot alternatives, booking confirmation, duplicate handling, and only
//! then a constrained LLM phrasing step. The early branches never call the
//! LLM, which is what guarantees no hallucinated options.

use crate::suggestions::closest_times;
use booking_agent_config::{DetectionSettings, LlmSettings};
use booking_agent_core::{FunctionCall, FunctionName, FunctionOutcome, SlotSet, Turn};
use booking_agent_functions::payload::{available_times, names as extract_names};
use booking_agent_functions::FunctionRunner;
use booking_agent_llm::{GenerationRequest, LlmBackend};
use serde_json::Value;
use std::sync::Arc;

const APOLOGY: &str = "I'm sorry, I couldn't complete that just now. Could you try again in a moment?";

const RESULTS_PROMPT: &str = "\
You are a booking assistant. Phrase one short reply to the patient using \
ONLY the function results below. Every check they describe has ALREADY run: \
never say you are \"about to check\", \"going to verify\" or \"will look \
into\" anything. Do not invent procedures, units, times or policies that \
are not in the results.";

/// A call paired with its outcome.
#[derive(Debug, Clone)]
pub struct ExecutedCall {
    pub call: FunctionCall,
    pub outcome: FunctionOutcome,
}

/// Synthesized reply plus any listing calls the synthesizer had to issue
/// itself to answer without inventing data.
#[derive(Debug)]
pub struct SynthesisResult {
    pub text: String,
    pub extra_calls: Vec<ExecutedCall>,
}

pub struct ResponseSynthesizer {
    llm: Arc<dyn LlmBackend>,
    runner: Arc<dyn FunctionRunner>,
    llm_settings: LlmSettings,
    max_suggestions: usize,
}

impl ResponseSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        runner: Arc<dyn FunctionRunner>,
        llm_settings: LlmSettings,
        detection: &DetectionSettings,
    ) -> Self {
        Self {
            llm,
            runner,
            llm_settings,
            max_suggestions: detection.max_suggestions,
        }
    }

    pub async fn respond(
        &self,
        executed: &[ExecutedCall],
        user_message: &str,
        slots: &SlotSet,
    ) -> SynthesisResult {
        // (a) invalid procedure/unit reference short-circuits everything
        if let Some(result) = self.invalid_reference(executed).await {
            return result;
        }

        // (b) successful listings answer directly, no LLM
        if let Some(text) = direct_listing(executed) {
            return SynthesisResult {
                text,
                extra_calls: Vec::new(),
            };
        }

        // (c) requested time not available: closest alternatives
        if let Some(text) = self.unavailable_slot(executed, slots) {
            return SynthesisResult {
                text,
                extra_calls: Vec::new(),
            };
        }

        // (d) booking confirmed
        if let Some(text) = booking_confirmation(executed) {
            return SynthesisResult {
                text,
                extra_calls: Vec::new(),
            };
        }

        // (e) duplicate booking, fixed template, zero LLM calls
        if let Some(text) = duplicate_notice(executed) {
            return SynthesisResult {
                text,
                extra_calls: Vec::new(),
            };
        }

        // (f) everything failed, or nothing special: constrained LLM phrasing
        if !executed.is_empty() && executed.iter().all(|e| !e.outcome.success) {
            return SynthesisResult {
                text: APOLOGY.to_string(),
                extra_calls: Vec::new(),
            };
        }
        self.phrase_with_llm(executed, user_message).await
    }

    /// (a): a validate call came back `exists: false`. Respond strictly
    /// from the matching listing; fetch it ourselves when the batch
    /// didn't include one.
    async fn invalid_reference(&self, executed: &[ExecutedCall]) -> Option<SynthesisResult> {
        let invalid = executed.iter().find(|e| {
            matches!(
                e.call.name,
                FunctionName::ValidateProcedure | FunctionName::ValidateUnit
            ) && e.outcome.data_field("exists").and_then(Value::as_bool) == Some(false)
        })?;

        let (listing_name, kind, question) = match invalid.call.name {
            FunctionName::ValidateProcedure => (
                FunctionName::ListProcedures,
                "procedure",
                "Which of these would you like to book?",
            ),
            _ => (
                FunctionName::ListUnits,
                "unit",
                "Which of these works for you?",
            ),
        };
        let rejected = invalid.call.str_arg("name").unwrap_or("that").to_string();

        let mut extra_calls = Vec::new();
        let listing_outcome = match executed
            .iter()
            .find(|e| e.call.name == listing_name && e.outcome.success)
        {
            Some(existing) => existing.outcome.clone(),
            None => {
                let call = FunctionCall::bare(listing_name);
                let outcome = self.runner.execute(&call).await;
                extra_calls.push(ExecutedCall {
                    call,
                    outcome: outcome.clone(),
                });
                outcome
            }
        };

        let options = if listing_outcome.success {
            extract_names(&listing_outcome.data)
        } else {
            Vec::new()
        };

        let text = if options.is_empty() {
            format!(
                "I'm sorry, \"{}\" isn't a {} we have on record, and I couldn't fetch the current options. Could you try a different {}?",
                rejected, kind, kind
            )
        } else {
            format!(
                "I'm sorry, \"{}\" isn't a {} we have on record. Here is what's available:\n{}\n{}",
                rejected,
                kind,
                bullet_list(&options),
                question
            )
        };

        Some(SynthesisResult { text, extra_calls })
    }

    /// (c): the requested time is not among the available ones.
    fn unavailable_slot(&self, executed: &[ExecutedCall], slots: &SlotSet) -> Option<String> {
        let availability = executed
            .iter()
            .find(|e| e.call.name == FunctionName::CheckAvailability && e.outcome.success)?;
        let requested = slots.time.as_deref()?;
        let available = available_times(&availability.outcome.data);
        if available.iter().any(|t| t == requested) {
            return None;
        }

        let date = availability
            .call
            .str_arg("date")
            .or(slots.date.as_deref())
            .unwrap_or("that day");
        let alternatives = closest_times(&available, requested, self.max_suggestions);
        if alternatives.is_empty() {
            return Some(format!(
                "Unfortunately {} has no open times left on {}. Would another day work for you?",
                requested, date
            ));
        }
        Some(format!(
            "Unfortunately {} isn't available on {}. The closest open times are:\n{}\nWould one of these work?",
            requested,
            date,
            bullet_list(&alternatives)
        ))
    }

    /// (f): terminal phrasing from the obtained results only.
    async fn phrase_with_llm(
        &self,
        executed: &[ExecutedCall],
        user_message: &str,
    ) -> SynthesisResult {
        let mut system = String::from(RESULTS_PROMPT);
        if executed.is_empty() {
            system.push_str("\n\nNo functions were executed this turn.");
        } else {
            system.push_str("\n\nFunction results:");
            for entry in executed {
                system.push_str(&format!(
                    "\n- {}: success={} data={} error={}",
                    entry.call.name,
                    entry.outcome.success,
                    entry.outcome.data,
                    entry.outcome.error.as_deref().unwrap_or("none"),
                ));
            }
        }

        let request = GenerationRequest::new(system, vec![Turn::user(user_message)])
            .with_temperature(self.llm_settings.temperature);

        let text = match self.llm.generate(&request).await {
            Ok(result) if !result.text.trim().is_empty() => result.text.trim().to_string(),
            Ok(_) => APOLOGY.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "synthesis LLM call failed");
                APOLOGY.to_string()
            }
        };

        SynthesisResult {
            text,
            extra_calls: Vec::new(),
        }
    }
}

/// (b): format a successful listing as bullets plus a clarifying question.
fn direct_listing(executed: &[ExecutedCall]) -> Option<String> {
    let listing = executed.iter().find(|e| {
        matches!(
            e.call.name,
            FunctionName::ListProcedures | FunctionName::ListUnits
        ) && e.outcome.success
    })?;

    let options = extract_names(&listing.outcome.data);
    if options.is_empty() {
        return None;
    }

    let (intro, question) = match listing.call.name {
        FunctionName::ListProcedures => (
            "Here are the procedures we offer:",
            "Which one would you like to book?",
        ),
        _ => (
            "Here are our units:",
            "Which one is most convenient for you?",
        ),
    };
    Some(format!("{}\n{}\n{}", intro, bullet_list(&options), question))
}

/// (d): fixed confirmation template from the creation result.
fn booking_confirmation(executed: &[ExecutedCall]) -> Option<String> {
    let created = executed
        .iter()
        .find(|e| e.call.name == FunctionName::CreateAppointment && e.outcome.success)?;

    let datetime = created.call.str_arg("datetime").unwrap_or_default();
    let (date, time) = datetime.split_once('T').unwrap_or((datetime, ""));
    let confirmation_id = ["id", "appointment_id", "confirmation_id"]
        .iter()
        .find_map(|key| created.outcome.data_field(key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "pending".to_string());

    Some(format!(
        "Your appointment is confirmed!\n\
         - Patient: {}\n\
         - Procedure: {}\n\
         - Unit: {}\n\
         - Date: {}\n\
         - Time: {}\n\
         Confirmation code: {}. See you then!",
        created.call.str_arg("name").unwrap_or("-"),
        created.call.str_arg("procedure").unwrap_or("-"),
        created.call.str_arg("unit").unwrap_or("-"),
        date,
        time.split(':').take(2).collect::<Vec<_>>().join(":"),
        confirmation_id,
    ))
}

/// (e): duplicate booking detected by the backend. Only a failed creation
/// call counts; "already exists" wording on any other call is not a
/// duplicate.
fn duplicate_notice(executed: &[ExecutedCall]) -> Option<String> {
    executed.iter().find(|e| {
        e.call.name == FunctionName::CreateAppointment
            && !e.outcome.success
            && e.outcome
                .error
                .as_deref()
                .map(|m| m.to_lowercase().contains("already exists"))
                .unwrap_or(false)
    })?;

    Some(
        "It looks like you already have an appointment at that exact time. Would you like to:\n\
         - pick another time on the same day,\n\
         - pick another day, or\n\
         - keep the existing appointment?\n\
         Just let me know."
            .to_string(),
    )
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use booking_agent_functions::CurrentDateTime;
    use booking_agent_llm::{GenerationResult, LlmError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLlm {
        calls: AtomicUsize,
        reply: String,
    }

    impl CountingLlm {
        fn new(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for CountingLlm {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResult, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GenerationResult {
                text: self.reply.clone(),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct ScriptedRunner {
        listing: FunctionOutcome,
    }

    #[async_trait]
    impl FunctionRunner for ScriptedRunner {
        async fn execute(&self, call: &FunctionCall) -> FunctionOutcome {
            match call.name {
                FunctionName::ListProcedures | FunctionName::ListUnits => self.listing.clone(),
                _ => FunctionOutcome::failure("unexpected call"),
            }
        }

        async fn current_datetime(&self) -> CurrentDateTime {
            CurrentDateTime {
                datetime: "2026-08-26T10:00:00".to_string(),
                degraded: false,
            }
        }
    }

    fn synthesizer(llm: Arc<CountingLlm>, listing: FunctionOutcome) -> ResponseSynthesizer {
        ResponseSynthesizer::new(
            llm,
            Arc::new(ScriptedRunner { listing }),
            LlmSettings::default(),
            &DetectionSettings::default(),
        )
    }

    fn executed(name: FunctionName, args: Value, outcome: FunctionOutcome) -> ExecutedCall {
        ExecutedCall {
            call: FunctionCall::new(name, args),
            outcome,
        }
    }

    #[tokio::test]
    async fn listing_is_rendered_directly_without_llm() {
        let llm = Arc::new(CountingLlm::new("should not be used"));
        let synth = synthesizer(llm.clone(), FunctionOutcome::failure("unused"));
        let batch = vec![executed(
            FunctionName::ListProcedures,
            json!({}),
            FunctionOutcome::ok(json!(["Cleaning", "Whitening"])),
        )];

        let result = synth.respond(&batch, "what do you offer?", &SlotSet::default()).await;

        assert!(result.text.contains("- Cleaning"));
        assert!(result.text.contains("- Whitening"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listed_options_are_a_subset_of_backend_data() {
        let llm = Arc::new(CountingLlm::new("unused"));
        let synth = synthesizer(llm, FunctionOutcome::failure("unused"));
        let options = ["Cleaning", "Whitening", "Root canal"];
        let batch = vec![executed(
            FunctionName::ListProcedures,
            json!({}),
            FunctionOutcome::ok(json!(options)),
        )];

        let result = synth.respond(&batch, "options?", &SlotSet::default()).await;

        for line in result.text.lines().filter(|l| l.starts_with("- ")) {
            assert!(options.contains(&&line[2..]), "invented option: {}", line);
        }
    }

    #[tokio::test]
    async fn invalid_procedure_answers_from_fetched_listing() {
        let llm = Arc::new(CountingLlm::new("unused"));
        let synth = synthesizer(
            llm.clone(),
            FunctionOutcome::ok(json!(["Cleaning", "Whitening"])),
        );
        let batch = vec![executed(
            FunctionName::ValidateProcedure,
            json!({"name": "Teleportation"}),
            FunctionOutcome::ok(json!({"exists": false})),
        )];

        let result = synth.respond(&batch, "book a teleportation", &SlotSet::default()).await;

        assert!(result.text.contains("\"Teleportation\""));
        assert!(result.text.contains("- Cleaning"));
        assert_eq!(result.extra_calls.len(), 1);
        assert_eq!(result.extra_calls[0].call.name, FunctionName::ListProcedures);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unavailable_time_suggests_closest_alternatives() {
        let llm = Arc::new(CountingLlm::new("unused"));
        let synth = synthesizer(llm.clone(), FunctionOutcome::failure("unused"));
        let slots = SlotSet {
            time: Some("13:45".into()),
            date: Some("2026-09-01".into()),
            ..Default::default()
        };
        let batch = vec![executed(
            FunctionName::CheckAvailability,
            json!({"unit": "Downtown", "date": "2026-09-01"}),
            FunctionOutcome::ok(json!({"available_times": ["09:00", "09:30", "14:00"]})),
        )];

        let result = synth.respond(&batch, "13:45 please", &slots).await;

        let positions: Vec<_> = ["- 14:00", "- 09:30", "- 09:00"]
            .iter()
            .map(|needle| result.text.find(needle).unwrap())
            .collect();
        assert!(positions[0] < positions[1] && positions[1] < positions[2]);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_error_uses_template_with_zero_llm_calls() {
        let llm = Arc::new(CountingLlm::new("unused"));
        let synth = synthesizer(llm.clone(), FunctionOutcome::failure("unused"));
        let batch = vec![executed(
            FunctionName::CreateAppointment,
            json!({"name": "Alice"}),
            FunctionOutcome::failure("an appointment already exists at this time"),
        )];

        let result = synth.respond(&batch, "yes book it", &SlotSet::default()).await;

        assert!(result.text.contains("another time"));
        assert!(result.text.contains("another day"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_wording_on_other_calls_is_not_a_duplicate() {
        let llm = Arc::new(CountingLlm::new("Let me get that sorted."));
        let synth = synthesizer(llm.clone(), FunctionOutcome::failure("unused"));
        // same wording, but this is not the creation call
        let batch = vec![
            executed(
                FunctionName::CheckDuplicate,
                json!({"name": "Alice"}),
                FunctionOutcome::failure("a record already exists for this patient"),
            ),
            executed(
                FunctionName::CheckAvailability,
                json!({"unit": "Downtown", "date": "2026-09-01"}),
                FunctionOutcome::ok(json!({"available_times": ["14:00"]})),
            ),
        ];

        let result = synth.respond(&batch, "is 2pm free?", &SlotSet::default()).await;

        assert!(!result.text.contains("keep the existing appointment"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn booking_success_renders_fixed_template() {
        let llm = Arc::new(CountingLlm::new("unused"));
        let synth = synthesizer(llm.clone(), FunctionOutcome::failure("unused"));
        let batch = vec![executed(
            FunctionName::CreateAppointment,
            json!({
                "name": "Alice",
                "procedure": "Cleaning",
                "unit": "Downtown",
                "datetime": "2026-09-01T14:00:00",
            }),
            FunctionOutcome::ok(json!({"id": "APT-42"})),
        )];

        let result = synth.respond(&batch, "confirm", &SlotSet::default()).await;

        assert!(result.text.contains("confirmed"));
        assert!(result.text.contains("Alice"));
        assert!(result.text.contains("2026-09-01"));
        assert!(result.text.contains("14:00"));
        assert!(result.text.contains("APT-42"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failures_apologize_without_llm() {
        let llm = Arc::new(CountingLlm::new("unused"));
        let synth = synthesizer(llm.clone(), FunctionOutcome::failure("unused"));
        let batch = vec![executed(
            FunctionName::CheckAvailability,
            json!({}),
            FunctionOutcome::failure("backend unreachable: timeout"),
        )];

        let result = synth.respond(&batch, "any slots?", &SlotSet::default()).await;

        assert_eq!(result.text, APOLOGY);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mixed_results_go_through_constrained_llm() {
        let llm = Arc::new(CountingLlm::new("All set for your visit."));
        let synth = synthesizer(llm.clone(), FunctionOutcome::failure("unused"));
        let slots = SlotSet {
            time: Some("09:00".into()),
            ..Default::default()
        };
        // requested time IS available, so (c) falls through to the LLM
        let batch = vec![executed(
            FunctionName::CheckAvailability,
            json!({"unit": "Downtown", "date": "2026-09-01"}),
            FunctionOutcome::ok(json!({"available_times": ["09:00"]})),
        )];

        let result = synth.respond(&batch, "is 9 free?", &slots).await;

        assert_eq!(result.text, "All set for your visit.");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }
}
