//! Slot extraction.
//!
//! Primary path is a low-temperature LLM call that must never invent
//! unstated facts. When that call fails the extractor falls back to
//! retrieval: slot values from the closest prior conversation, backfilled
//! from the patient's appointment history when the name is known. Total
//! failure yields an empty result at confidence zero; extraction itself
//! never errors.

use crate::memory::Sentiment;
use booking_agent_config::LlmSettings;
use booking_agent_core::{slots::SlotPatch, slots::SlotSet, Turn};
use booking_agent_llm::{GenerationRequest, LlmBackend};
use booking_agent_rag::{ContextRetriever, RagContext};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

const EXTRACTION_PROMPT: &str = "\
You extract appointment booking fields from one patient message.
Return ONLY a JSON object with these keys, omitting any field the message \
does not state: name, procedure, unit, date (YYYY-MM-DD), time (HH:MM), \
email, sentiment (positive|neutral|negative), confidence (0.0-1.0).
Rules:
- Never invent values. A greeting or filler message yields {\"confidence\": 0.0}.
- Resolve relative dates (\"tomorrow\", \"next monday\") against the current \
date given below into absolute YYYY-MM-DD form.
- confidence reflects how unambiguous the stated fields are; an explicit, \
complete statement can reach 0.95.";

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

/// Transient result of extracting one message.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub patch: SlotPatch,
    pub confidence: f32,
    pub sentiment: Option<Sentiment>,
    /// Context fetched by the fallback path, reused by the caller so the
    /// retriever is not queried twice in one degraded turn.
    pub rag: Option<RagContext>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireExtraction {
    name: Option<String>,
    procedure: Option<String>,
    unit: Option<String>,
    date: Option<String>,
    time: Option<String>,
    email: Option<String>,
    sentiment: Option<String>,
    confidence: Option<f32>,
}

impl WireExtraction {
    fn into_result(self) -> ExtractionResult {
        let patch = SlotPatch {
            name: self.name,
            procedure: self.procedure,
            unit: self.unit,
            date: self.date,
            time: self.time,
            email: self.email,
            ..Default::default()
        };
        let sentiment = self.sentiment.as_deref().and_then(|s| match s {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        });
        let confidence = match self.confidence {
            Some(c) => c.clamp(0.0, 1.0),
            None if patch.is_empty() => 0.0,
            // fields without a stated confidence: moderately trusted
            None => 0.5,
        };
        ExtractionResult {
            patch,
            confidence,
            sentiment,
            rag: None,
        }
    }
}

pub struct SlotExtractor {
    llm: Arc<dyn LlmBackend>,
    retriever: Arc<ContextRetriever>,
    settings: LlmSettings,
}

impl SlotExtractor {
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        retriever: Arc<ContextRetriever>,
        settings: LlmSettings,
    ) -> Self {
        Self {
            llm,
            retriever,
            settings,
        }
    }

    pub async fn extract(
        &self,
        message: &str,
        prior_slots: &SlotSet,
        current_datetime: &str,
    ) -> ExtractionResult {
        match self.extract_with_llm(message, prior_slots, current_datetime).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "LLM extraction failed, using retrieval fallback");
                metrics::counter!("slot_extraction_fallbacks_total").increment(1);
                self.extract_from_retrieval(message, prior_slots).await
            }
        }
    }

    async fn extract_with_llm(
        &self,
        message: &str,
        prior_slots: &SlotSet,
        current_datetime: &str,
    ) -> Result<ExtractionResult, booking_agent_llm::LlmError> {
        let known = serde_json::to_string(prior_slots).unwrap_or_else(|_| "{}".to_string());
        let system = format!(
            "{}\nCurrent date and time: {}\nFields already known (do not re-extract unless restated): {}",
            EXTRACTION_PROMPT, current_datetime, known
        );

        let request = GenerationRequest::new(system, vec![Turn::user(message)])
            .with_temperature(self.settings.extraction_temperature);

        let generated = self.llm.generate(&request).await?;
        Ok(parse_extraction(&generated.text))
    }

    /// Degraded path: closest prior conversation supplies the slots, with
    /// history backfill when the patient is identifiable.
    async fn extract_from_retrieval(&self, message: &str, prior_slots: &SlotSet) -> ExtractionResult {
        let context = self.retriever.retrieve(message, prior_slots).await;

        let mut result = ExtractionResult::default();
        if let Some(best) = context
            .conversations
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
        {
            result.patch = best.slots.clone();
            result.confidence = (context.conversation_avg_score() * 0.8).min(0.7);
        }

        if let Some(latest) = context.history.first() {
            let mut backfilled = false;
            if result.patch.procedure.is_none() && prior_slots.procedure.is_none() {
                result.patch.procedure = Some(latest.procedure.clone());
                backfilled = true;
            }
            if result.patch.unit.is_none() && prior_slots.unit.is_none() {
                result.patch.unit = Some(latest.unit.clone());
                backfilled = true;
            }
            if backfilled {
                result.confidence = result.confidence.max(0.6);
            }
        }

        result.rag = Some(context);
        result
    }
}

/// Parse LLM output into an extraction, tolerating markdown fences and
/// surrounding prose. Unparseable output is an empty result.
fn parse_extraction(text: &str) -> ExtractionResult {
    let stripped = strip_fences(text);
    let candidate = JSON_OBJECT
        .find(&stripped)
        .map(|m| m.as_str())
        .unwrap_or("");

    match serde_json::from_str::<WireExtraction>(candidate) {
        Ok(wire) => wire.into_result(),
        Err(_) => {
            tracing::debug!("extraction output had no parseable JSON object");
            ExtractionResult::default()
        }
    }
}

fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let result = parse_extraction(
            r#"{"name": "Alice Moore", "date": "2026-09-01", "confidence": 0.9}"#,
        );
        assert_eq!(result.patch.name.as_deref(), Some("Alice Moore"));
        assert_eq!(result.patch.date.as_deref(), Some("2026-09-01"));
        assert!((result.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let text = "Here is the extraction:\n```json\n{\"procedure\": \"Cleaning\", \"confidence\": 0.8}\n```\nDone.";
        let result = parse_extraction(text);
        assert_eq!(result.patch.procedure.as_deref(), Some("Cleaning"));
    }

    #[test]
    fn garbage_yields_empty_zero_confidence() {
        let result = parse_extraction("I could not find anything useful.");
        assert!(result.patch.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn missing_confidence_with_no_fields_is_zero() {
        let result = parse_extraction("{}");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn confidence_is_clamped() {
        let result = parse_extraction(r#"{"name": "A", "confidence": 3.0}"#);
        assert!((result.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sentiment_is_decoded() {
        let result = parse_extraction(r#"{"sentiment": "negative", "confidence": 0.1}"#);
        assert_eq!(result.sentiment, Some(Sentiment::Negative));
    }

    mod fallback {
        use super::*;
        use async_trait::async_trait;
        use booking_agent_config::RagSettings;
        use booking_agent_llm::{GenerationResult, LlmError};
        use booking_agent_rag::vector_store::SearchHit;
        use booking_agent_rag::{CollectionNames, RagError, SimpleEmbedder, VectorSearch};
        use std::collections::HashMap;

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

        struct ScriptedStore {
            conversations: Vec<SearchHit>,
            history: Vec<SearchHit>,
        }

        #[async_trait]
        impl VectorSearch for ScriptedStore {
            async fn search(
                &self,
                collection: &str,
                _embedding: &[f32],
                _top_k: u64,
                _threshold: f32,
            ) -> Result<Vec<SearchHit>, RagError> {
                Ok(match collection {
                    "conv" => self.conversations.clone(),
                    "appt" => self.history.clone(),
                    _ => Vec::new(),
                })
            }

            async fn scroll(
                &self,
                _collection: &str,
                _limit: u32,
            ) -> Result<Vec<SearchHit>, RagError> {
                Ok(Vec::new())
            }
        }

        fn conversation_hit(score: f32, slots_json: &str) -> SearchHit {
            let mut metadata = HashMap::new();
            metadata.insert("slots".to_string(), slots_json.to_string());
            SearchHit {
                id: "c".into(),
                score,
                content: "past conversation".into(),
                metadata,
            }
        }

        fn history_hit(procedure: &str, unit: &str) -> SearchHit {
            let mut metadata = HashMap::new();
            metadata.insert("patient_name".to_string(), "Alice".to_string());
            metadata.insert("procedure".to_string(), procedure.to_string());
            metadata.insert("unit".to_string(), unit.to_string());
            metadata.insert("datetime".to_string(), "2026-05-01T10:00:00".to_string());
            SearchHit {
                id: "h".into(),
                score: 0.9,
                content: "alice".into(),
                metadata,
            }
        }

        fn extractor(store: ScriptedStore) -> SlotExtractor {
            let retriever = Arc::new(ContextRetriever::new(
                Arc::new(store),
                Arc::new(SimpleEmbedder::new(32)),
                CollectionNames {
                    faq: "faq".into(),
                    conversation: "conv".into(),
                    appointment: "appt".into(),
                },
                RagSettings::default(),
            ));
            SlotExtractor::new(Arc::new(FailingLlm), retriever, LlmSettings::default())
        }

        #[tokio::test]
        async fn best_conversation_supplies_slots() {
            let extractor = extractor(ScriptedStore {
                conversations: vec![
                    conversation_hit(0.8, r#"{"procedure": "Cleaning"}"#),
                    conversation_hit(0.9, r#"{"procedure": "Whitening"}"#),
                ],
                history: Vec::new(),
            });

            let result = extractor
                .extract("same as before please", &SlotSet::default(), "2026-08-26T10:00:00")
                .await;

            assert_eq!(result.patch.procedure.as_deref(), Some("Whitening"));
            // min(0.7, avg(0.85) * 0.8) = 0.68
            assert!((result.confidence - 0.68).abs() < 1e-3);
            assert!(result.rag.is_some());
        }

        #[tokio::test]
        async fn history_backfill_raises_confidence() {
            let extractor = extractor(ScriptedStore {
                conversations: Vec::new(),
                history: vec![history_hit("Cleaning", "Downtown")],
            });
            let prior = SlotSet {
                name: Some("Alice".into()),
                ..Default::default()
            };

            let result = extractor
                .extract("book me in again", &prior, "2026-08-26T10:00:00")
                .await;

            assert_eq!(result.patch.procedure.as_deref(), Some("Cleaning"));
            assert_eq!(result.patch.unit.as_deref(), Some("Downtown"));
            assert!(result.confidence >= 0.6);
        }

        #[tokio::test]
        async fn nothing_found_yields_empty_zero() {
            let extractor = extractor(ScriptedStore {
                conversations: Vec::new(),
                history: Vec::new(),
            });
            let result = extractor
                .extract("hello", &SlotSet::default(), "2026-08-26T10:00:00")
                .await;
            assert!(result.patch.is_empty());
            assert_eq!(result.confidence, 0.0);
        }
    }
}
