//! The per-message loop.
//!
//! One entry point, [`Orchestrator::process_message`], drives a full turn:
//! session lookup, slot extraction and merge, catalog validation, context
//! retrieval, scenario detection, human-handoff check, forced or
//! LLM-planned function calls, synthesis, and post-booking cleanup.
//! Downstream failures degrade into apologetic replies; the only errors
//! this returns are session-store contract violations.

use crate::extractor::SlotExtractor;
use crate::fallback::FallbackDetector;
use crate::memory::{ContextPatch, SessionStore};
use crate::preload::DataPreload;
use crate::proactive::forced_calls;
use crate::prompt::{build_system_prompt, PromptInputs};
use crate::scenario::{detect_scenario, ScenarioInputs};
use crate::synthesizer::{ExecutedCall, ResponseSynthesizer};
use crate::validation::ValidationService;
use crate::AgentError;
use booking_agent_config::{DetectionSettings, LlmSettings};
use crate::memory::Sentiment;
use booking_agent_core::{
    slots::SlotPatch, AgentReply, CoreError, FunctionCall, FunctionName, Scenario, SlotSet, Turn,
};
use booking_agent_functions::{tool_definitions, FunctionRunner};
use booking_agent_llm::{GenerationRequest, LlmBackend};
use booking_agent_rag::{
    AppointmentSync, ArchivedConversation, BookedAppointment, ContextRetriever,
    ConversationArchiver, ConversationOutcome,
};
use std::sync::Arc;

/// How much conversation tail the main LLM call sees.
const LLM_TURN_WINDOW: usize = 10;

pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmBackend>,
    retriever: Arc<ContextRetriever>,
    runner: Arc<dyn FunctionRunner>,
    preload: Arc<DataPreload>,
    history: Option<Arc<AppointmentSync>>,
    archiver: Option<Arc<ConversationArchiver>>,
    extractor: SlotExtractor,
    synthesizer: ResponseSynthesizer,
    fallback: FallbackDetector,
    llm_settings: LlmSettings,
    detection: DetectionSettings,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmBackend>,
        retriever: Arc<ContextRetriever>,
        runner: Arc<dyn FunctionRunner>,
        preload: Arc<DataPreload>,
        history: Option<Arc<AppointmentSync>>,
        archiver: Option<Arc<ConversationArchiver>>,
        llm_settings: LlmSettings,
        detection: DetectionSettings,
    ) -> Self {
        let extractor = SlotExtractor::new(
            Arc::clone(&llm),
            Arc::clone(&retriever),
            llm_settings.clone(),
        );
        let synthesizer = ResponseSynthesizer::new(
            Arc::clone(&llm),
            Arc::clone(&runner),
            llm_settings.clone(),
            &detection,
        );
        let fallback = FallbackDetector::new(detection.clone());
        Self {
            store,
            llm,
            retriever,
            runner,
            preload,
            history,
            archiver,
            extractor,
            synthesizer,
            fallback,
            llm_settings,
            detection,
        }
    }

    /// Process one user message, returning the session id (created on
    /// demand) and the reply.
    pub async fn process_message(
        &self,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<(String, AgentReply), AgentError> {
        let session_id = self.resolve_session(session_id);
        self.store.append_message(&session_id, Turn::user(message))?;
        metrics::counter!("agent_messages_total").increment(1);

        let now = self.runner.current_datetime().await;
        let current_date = now
            .datetime
            .split('T')
            .next()
            .unwrap_or(&now.datetime)
            .to_string();

        let prior = self
            .store
            .get(&session_id)
            .ok_or_else(|| CoreError::SessionNotFound(session_id.clone()))?;

        let extraction = self
            .extractor
            .extract(message, &prior.slots, &now.datetime)
            .await;
        let degraded_turn = extraction.rag.is_some();

        // Merge policy: a low-confidence extraction never overwrites what
        // the user already gave us. Email is the exception, it is sticky
        // the moment it is stated.
        let slots = if extraction.confidence < self.detection.low_confidence {
            match extraction.patch.email.clone() {
                Some(email) => self.store.merge_slots(
                    &session_id,
                    &SlotPatch {
                        email: Some(email),
                        ..Default::default()
                    },
                )?,
                None => prior.slots.clone(),
            }
        } else {
            self.store.merge_slots(&session_id, &extraction.patch)?
        };

        let catalogs = self.preload.snapshot();
        let validation = ValidationService::validate(&slots, &catalogs, &current_date);
        let slots = if validation.patch == SlotPatch::default() {
            slots
        } else {
            self.store.merge_slots(&session_id, &validation.patch)?
        };

        // The extraction fallback already retrieved context this turn.
        let rag = match extraction.rag {
            Some(rag) => rag,
            None => self.retriever.retrieve(message, &slots).await,
        };

        let scenario = detect_scenario(
            &ScenarioInputs {
                message,
                message_count: prior.context.message_count,
                slots: &slots,
                confidence: extraction.confidence,
                faq_found: !rag.faq.is_empty(),
            },
            &self.detection,
        );
        // A turn whose extraction had to fall back is an error-handling
        // turn whatever the detector says; the prompt guidance shifts to
        // recovering gracefully.
        let scenario = if degraded_turn {
            Scenario::ErrorHandling
        } else {
            scenario
        };
        tracing::debug!(
            session_id = %session_id,
            ?scenario,
            confidence = extraction.confidence,
            degraded_turn,
            "turn classified"
        );

        let fallback_count = if degraded_turn {
            prior.context.fallback_count + 1
        } else {
            0
        };
        self.store.merge_context(
            &session_id,
            ContextPatch {
                last_scenario: Some(scenario),
                fallback_count: Some(fallback_count),
                sentiment: extraction.sentiment,
            },
        )?;

        let context = self
            .store
            .get(&session_id)
            .ok_or_else(|| CoreError::SessionNotFound(session_id.clone()))?
            .context;
        if let Some(handoff) = self.fallback.check(&context, &slots) {
            self.store
                .append_message(&session_id, Turn::assistant(handoff))?;
            self.archive_conversation(
                &session_id,
                &slots,
                ConversationOutcome::Fallback,
                context.sentiment,
            );
            let mut reply = AgentReply::text(handoff, slots, scenario);
            reply.needs_human = true;
            return Ok((session_id, reply));
        }

        // Forced calls skip LLM planning entirely; otherwise the model
        // plans with the tool schemas and its text is kept only when it
        // requested no calls.
        let forced = forced_calls(scenario, &slots);
        let (mut executed, direct_text) = if forced.is_empty() {
            let prompt = build_system_prompt(&PromptInputs {
                scenario,
                slots: &slots,
                catalogs: &catalogs,
                rag: &rag,
                validation_context: &validation.context_text,
                current_datetime: &now.datetime,
                degraded_clock: now.degraded,
            });
            self.plan_with_llm(&session_id, prompt).await?
        } else {
            let outcomes = self.runner.execute_all(&forced).await;
            let executed = forced
                .into_iter()
                .zip(outcomes)
                .map(|(call, outcome)| ExecutedCall { call, outcome })
                .collect();
            (executed, None)
        };

        let response = match direct_text {
            Some(text) => text,
            None => {
                let synthesis = self.synthesizer.respond(&executed, message, &slots).await;
                executed.extend(synthesis.extra_calls);
                synthesis.text
            }
        };

        let booked = executed
            .iter()
            .find(|e| e.call.name == FunctionName::CreateAppointment && e.outcome.success)
            .map(|e| e.call.clone());
        let session_completed = booked.is_some();
        if let Some(call) = booked {
            self.record_booking(&call);
            self.store.reset_slots(&session_id)?;
        }

        let function_calls: Vec<FunctionCall> = executed.into_iter().map(|e| e.call).collect();
        self.store
            .append_message(&session_id, Turn::assistant(&response))?;
        if session_completed {
            self.archive_conversation(
                &session_id,
                &slots,
                ConversationOutcome::Completed,
                context.sentiment,
            );
        }

        Ok((
            session_id,
            AgentReply {
                response,
                slots,
                function_calls,
                needs_human: false,
                scenario,
                session_completed,
            },
        ))
    }

    fn resolve_session(&self, session_id: Option<&str>) -> String {
        match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => {
                if self.store.get(id).is_some() {
                    id.to_string()
                } else {
                    // unknown (possibly swept) ids are recreated in place
                    self.store.create_with_id(id)
                }
            }
            _ => self.store.create(),
        }
    }

    /// One LLM planning call. Tool invocations are executed in order;
    /// plain text with no invocations is the reply itself. A failed call
    /// here is not terminal, synthesis falls back to its apology.
    async fn plan_with_llm(
        &self,
        session_id: &str,
        system: String,
    ) -> Result<(Vec<ExecutedCall>, Option<String>), AgentError> {
        let turns = self.store.recent_messages(session_id, LLM_TURN_WINDOW)?;
        let request = GenerationRequest::new(system, turns)
            .with_tools(tool_definitions())
            .with_temperature(self.llm_settings.temperature);

        let generated = match self.llm.generate(&request).await {
            Ok(generated) => generated,
            Err(err) => {
                tracing::warn!(error = %err, "planning LLM call failed");
                return Ok((Vec::new(), None));
            }
        };

        if !generated.has_tool_calls() {
            let text = generated.text.trim();
            if text.is_empty() {
                return Ok((Vec::new(), None));
            }
            return Ok((Vec::new(), Some(text.to_string())));
        }

        let mut calls = Vec::new();
        for invocation in generated.tool_calls {
            match FunctionName::parse(&invocation.name) {
                Some(name) => calls.push(FunctionCall::new(name, invocation.arguments)),
                None => {
                    let unknown = CoreError::UnknownFunction(invocation.name);
                    tracing::warn!(error = %unknown, "dropping LLM tool call");
                    metrics::counter!("agent_unknown_functions_total").increment(1);
                }
            }
        }
        let outcomes = self.runner.execute_all(&calls).await;
        let executed = calls
            .into_iter()
            .zip(outcomes)
            .map(|(call, outcome)| ExecutedCall { call, outcome })
            .collect();
        Ok((executed, None))
    }

    /// Fire-and-forget history write from a completed booking call.
    fn record_booking(&self, call: &FunctionCall) {
        let Some(sync) = &self.history else {
            return;
        };
        let appointment = BookedAppointment {
            patient_name: call.str_arg("name").unwrap_or_default().to_string(),
            procedure: call.str_arg("procedure").unwrap_or_default().to_string(),
            unit: call.str_arg("unit").unwrap_or_default().to_string(),
            datetime: call.str_arg("datetime").unwrap_or_default().to_string(),
        };
        sync.record(appointment);
    }

    /// Fire-and-forget archive of the finished conversation, slots and
    /// outcome included, into long-term memory.
    fn archive_conversation(
        &self,
        session_id: &str,
        slots: &SlotSet,
        outcome: ConversationOutcome,
        sentiment: Sentiment,
    ) {
        let Some(archiver) = &self.archiver else {
            return;
        };
        let turns = match self.store.recent_messages(session_id, usize::MAX) {
            Ok(turns) => turns,
            Err(err) => {
                tracing::warn!(error = %err, "conversation archive skipped");
                return;
            }
        };
        let transcript = turns
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.text))
            .collect::<Vec<_>>()
            .join("\n");
        archiver.archive(ArchivedConversation {
            session_id: session_id.to_string(),
            transcript,
            slots: slots.clone(),
            outcome,
            sentiment: sentiment.as_str().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySessionStore;
    use async_trait::async_trait;
    use booking_agent_config::RagSettings;
    use booking_agent_core::{FunctionOutcome, Scenario, SlotSet};
    use booking_agent_functions::CurrentDateTime;
    use booking_agent_llm::{GenerationResult, LlmError, ToolInvocation};
    use booking_agent_rag::vector_store::SearchHit;
    use booking_agent_rag::{CollectionNames, RagError, SimpleEmbedder, VectorSearch};
    use serde_json::json;

    struct FixedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmBackend for FixedLlm {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResult, LlmError> {
            Ok(GenerationResult {
                text: self.reply.clone(),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct ScriptedRunner;

    #[async_trait]
    impl FunctionRunner for ScriptedRunner {
        async fn execute(&self, call: &FunctionCall) -> FunctionOutcome {
            match call.name {
                FunctionName::ListProcedures => {
                    FunctionOutcome::ok(json!(["Cleaning", "Whitening"]))
                }
                FunctionName::ListUnits => FunctionOutcome::ok(json!(["Downtown", "Uptown"])),
                FunctionName::ValidateProcedure | FunctionName::ValidateUnit => {
                    FunctionOutcome::ok(json!({"exists": true}))
                }
                FunctionName::CheckAvailability => {
                    FunctionOutcome::ok(json!({"available_times": ["14:00"]}))
                }
                FunctionName::CheckDuplicate => FunctionOutcome::ok(json!({"duplicate": false})),
                FunctionName::CreateAppointment => FunctionOutcome::ok(json!({"id": "APT-1"})),
            }
        }

        async fn current_datetime(&self) -> CurrentDateTime {
            CurrentDateTime {
                datetime: "2026-08-26T10:00:00".to_string(),
                degraded: false,
            }
        }
    }

    struct EmptyStore;

    #[async_trait]
    impl VectorSearch for EmptyStore {
        async fn search(
            &self,
            _collection: &str,
            _embedding: &[f32],
            _top_k: u64,
            _threshold: f32,
        ) -> Result<Vec<SearchHit>, RagError> {
            Ok(Vec::new())
        }

        async fn scroll(&self, _collection: &str, _limit: u32) -> Result<Vec<SearchHit>, RagError> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(extraction_reply: &str) -> (Orchestrator, Arc<InMemorySessionStore>) {
        orchestrator_with_llm(Arc::new(FixedLlm {
            reply: extraction_reply.to_string(),
        }))
    }

    fn orchestrator_with_llm(llm: Arc<dyn LlmBackend>) -> (Orchestrator, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new(10));
        let runner = Arc::new(ScriptedRunner);
        let retriever = Arc::new(ContextRetriever::new(
            Arc::new(EmptyStore),
            Arc::new(SimpleEmbedder::new(32)),
            CollectionNames {
                faq: "faq".into(),
                conversation: "conv".into(),
                appointment: "appt".into(),
            },
            RagSettings::default(),
        ));
        let orchestrator = Orchestrator::new(
            store.clone(),
            llm,
            retriever,
            runner.clone(),
            Arc::new(DataPreload::new(runner)),
            None,
            None,
            LlmSettings::default(),
            DetectionSettings::default(),
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn greeting_lists_procedures_proactively() {
        let (orchestrator, _store) = orchestrator(r#"{"confidence": 0.0}"#);

        let (session_id, reply) = orchestrator.process_message(None, "Hi").await.unwrap();

        assert!(!session_id.is_empty());
        assert_eq!(reply.scenario, Scenario::Greeting);
        assert_eq!(reply.function_calls.len(), 1);
        assert_eq!(reply.function_calls[0].name, FunctionName::ListProcedures);
        assert!(reply.response.contains("- Cleaning"));
        assert!(!reply.needs_human);
        assert!(!reply.session_completed);
    }

    #[tokio::test]
    async fn low_confidence_preserves_slots_but_email_sticks() {
        let (orchestrator, store) =
            orchestrator(r#"{"name": "Bob", "email": "alice@example.com", "confidence": 0.1}"#);
        let session_id = store.create();
        store
            .merge_slots(
                &session_id,
                &SlotPatch {
                    name: Some("Alice".into()),
                    procedure: Some("Cleaning".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let (_, reply) = orchestrator
            .process_message(Some(&session_id), "uh it's alice at example dot com")
            .await
            .unwrap();

        assert_eq!(reply.slots.name.as_deref(), Some("Alice"));
        assert_eq!(reply.slots.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn slot_merge_is_monotonic_across_turns() {
        let (orchestrator, store) =
            orchestrator(r#"{"procedure": "Whitening", "confidence": 0.9}"#);
        let session_id = store.create();
        store
            .merge_slots(
                &session_id,
                &SlotPatch {
                    name: Some("Alice".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let (_, reply) = orchestrator
            .process_message(Some(&session_id), "make it a whitening instead")
            .await
            .unwrap();

        // new value lands, earlier field survives
        assert_eq!(reply.slots.procedure.as_deref(), Some("Whitening"));
        assert_eq!(reply.slots.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn confirmed_booking_completes_and_resets() {
        let (orchestrator, store) = orchestrator(r#"{"confidence": 0.0}"#);
        let session_id = store.create();
        store
            .merge_slots(
                &session_id,
                &SlotPatch {
                    name: Some("Alice".into()),
                    procedure: Some("Cleaning".into()),
                    unit: Some("Downtown".into()),
                    date: Some("2026-09-01".into()),
                    time: Some("14:00".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let (_, reply) = orchestrator
            .process_message(Some(&session_id), "yes, book it")
            .await
            .unwrap();

        assert_eq!(reply.scenario, Scenario::Scheduling);
        assert!(reply.session_completed);
        assert!(reply.response.contains("confirmed"));
        assert!(reply.response.contains("APT-1"));
        // reply carries the booked slots; the stored session starts clean
        assert_eq!(reply.slots.name.as_deref(), Some("Alice"));
        assert_eq!(store.get(&session_id).unwrap().slots, SlotSet::default());
    }

    #[tokio::test]
    async fn negative_sentiment_hands_off() {
        let (orchestrator, _store) =
            orchestrator(r#"{"sentiment": "negative", "confidence": 0.2}"#);

        let (_, reply) = orchestrator
            .process_message(None, "this is useless, nothing works")
            .await
            .unwrap();

        assert!(reply.needs_human);
        assert!(reply.function_calls.is_empty());
        assert!(reply.response.contains("team members"));
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmBackend for FailingLlm {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResult, LlmError> {
            Err(LlmError::Request("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Extraction calls (no tools) get a fixed JSON reply; planning calls
    /// (tools attached) get scripted tool invocations.
    struct PlannerLlm {
        extraction: String,
        invocations: Vec<ToolInvocation>,
    }

    #[async_trait]
    impl LlmBackend for PlannerLlm {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResult, LlmError> {
            if request.tools.is_empty() {
                return Ok(GenerationResult {
                    text: self.extraction.clone(),
                    ..Default::default()
                });
            }
            Ok(GenerationResult {
                tool_calls: self.invocations.clone(),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            "planner"
        }
    }

    #[tokio::test]
    async fn unplanned_function_names_are_dropped() {
        let (orchestrator, _store) = orchestrator_with_llm(Arc::new(PlannerLlm {
            extraction: r#"{"name": "Alice", "confidence": 0.6}"#.to_string(),
            invocations: vec![
                ToolInvocation {
                    name: "send_fax".to_string(),
                    arguments: json!({}),
                },
                ToolInvocation {
                    name: "list_units".to_string(),
                    arguments: json!({}),
                },
            ],
        }));

        let (_, reply) = orchestrator
            .process_message(None, "I'm Alice, I need an appointment")
            .await
            .unwrap();

        // the invented name never reaches the executor, the known one does
        assert_eq!(reply.function_calls.len(), 1);
        assert_eq!(reply.function_calls[0].name, FunctionName::ListUnits);
        assert!(reply.response.contains("- Downtown"));
    }

    #[tokio::test]
    async fn degraded_extraction_turn_is_error_handling() {
        let (orchestrator, _store) = orchestrator_with_llm(Arc::new(FailingLlm));

        let (_, reply) = orchestrator
            .process_message(None, "hello there")
            .await
            .unwrap();

        assert_eq!(reply.scenario, Scenario::ErrorHandling);
        assert!(!reply.needs_human);
        assert!(reply.response.contains("try again"));
    }

    #[tokio::test]
    async fn unknown_session_id_is_recreated_in_place() {
        let (orchestrator, store) = orchestrator(r#"{"confidence": 0.0}"#);

        let (session_id, _) = orchestrator
            .process_message(Some("swept-away"), "Hi")
            .await
            .unwrap();

        assert_eq!(session_id, "swept-away");
        assert!(store.get("swept-away").is_some());
    }
}
