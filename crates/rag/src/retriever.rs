//! Context retriever across the FAQ, conversation and appointment
//! collections.
//!
//! The three sub-searches are independent and best-effort: a failure or
//! empty result in one never blocks the others, and every failure path
//! degrades to an empty section with a warning log.

use crate::embeddings::Embedder;
use crate::vector_store::{SearchHit, VectorStore};
use crate::RagError;
use async_trait::async_trait;
use booking_agent_config::RagSettings;
use booking_agent_core::slots::{SlotPatch, SlotSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Search surface the retriever needs from a vector store. Split out so
/// tests can script hits without a running Qdrant.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, RagError>;

    async fn scroll(&self, collection: &str, limit: u32) -> Result<Vec<SearchHit>, RagError>;
}

#[async_trait]
impl VectorSearch for VectorStore {
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, RagError> {
        VectorStore::search(self, collection, embedding, top_k, score_threshold).await
    }

    async fn scroll(&self, collection: &str, limit: u32) -> Result<Vec<SearchHit>, RagError> {
        VectorStore::scroll(self, collection, limit).await
    }
}

/// Names of the three logical collections.
#[derive(Debug, Clone)]
pub struct CollectionNames {
    pub faq: String,
    pub conversation: String,
    pub appointment: String,
}

/// One FAQ entry relevant to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqMatch {
    pub question: String,
    pub answer: String,
    pub score: f32,
}

/// A similar prior conversation with the slots it ended with.
#[derive(Debug, Clone)]
pub struct ConversationMatch {
    pub slots: SlotPatch,
    pub outcome: Option<String>,
    pub score: f32,
}

/// One appointment from the patient's history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub patient_name: String,
    pub procedure: String,
    pub unit: String,
    pub datetime: String,
}

/// Preferences inferred from appointment history by frequency counting.
#[derive(Debug, Clone, Default)]
pub struct PatientPreferences {
    pub preferred_unit: Option<String>,
    /// Most frequent hour of day, rendered "HH:00".
    pub preferred_hour: Option<String>,
    pub procedures: Vec<String>,
}

/// Aggregate retrieval result for one message. Never authoritative.
#[derive(Debug, Clone, Default)]
pub struct RagContext {
    pub faq: Vec<FaqMatch>,
    pub conversations: Vec<ConversationMatch>,
    pub history: Vec<HistoryEntry>,
    pub preferences: Option<PatientPreferences>,
}

impl RagContext {
    pub fn is_empty(&self) -> bool {
        self.faq.is_empty() && self.conversations.is_empty() && self.history.is_empty()
    }

    /// Mean score of the conversation matches, 0 when there are none.
    pub fn conversation_avg_score(&self) -> f32 {
        if self.conversations.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.conversations.iter().map(|c| c.score).sum();
        sum / self.conversations.len() as f32
    }
}

pub struct ContextRetriever {
    store: Arc<dyn VectorSearch>,
    embedder: Arc<dyn Embedder>,
    collections: CollectionNames,
    settings: RagSettings,
}

impl ContextRetriever {
    pub fn new(
        store: Arc<dyn VectorSearch>,
        embedder: Arc<dyn Embedder>,
        collections: CollectionNames,
        settings: RagSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            collections,
            settings,
        }
    }

    /// Retrieve context for one user message. Always succeeds; missing or
    /// failed sections come back empty.
    pub async fn retrieve(&self, message: &str, slots: &SlotSet) -> RagContext {
        let mut context = RagContext::default();

        let query_embedding = match self.embedder.embed(message).await {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!(error = %err, "query embedding failed, semantic search skipped");
                None
            }
        };

        if let Some(ref embedding) = query_embedding {
            context.conversations = self.search_conversations(embedding).await;
            context.faq = self.search_faq_semantic(embedding).await;
        }

        if context.faq.is_empty() {
            context.faq = self.search_faq_keywords(message).await;
        }

        if let Some(name) = slots.name.as_deref() {
            context.history = self.search_history(name).await;
            if !context.history.is_empty() {
                context.preferences = Some(infer_preferences(&context.history));
            }
        }

        tracing::debug!(
            faq = context.faq.len(),
            conversations = context.conversations.len(),
            history = context.history.len(),
            "context retrieved"
        );
        context
    }

    async fn search_conversations(&self, embedding: &[f32]) -> Vec<ConversationMatch> {
        let hits = match self
            .store
            .search(
                &self.collections.conversation,
                embedding,
                self.settings.top_k,
                self.settings.score_threshold,
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "conversation search failed");
                return Vec::new();
            }
        };

        hits.into_iter()
            .map(|hit| ConversationMatch {
                slots: decode_slots(&hit.metadata),
                outcome: hit.metadata.get("outcome").cloned(),
                score: hit.score,
            })
            .collect()
    }

    async fn search_faq_semantic(&self, embedding: &[f32]) -> Vec<FaqMatch> {
        let hits = match self
            .store
            .search(
                &self.collections.faq,
                embedding,
                self.settings.top_k,
                self.settings.faq_threshold,
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "FAQ search failed");
                return Vec::new();
            }
        };
        hits.into_iter().map(faq_from_hit).collect()
    }

    /// Keyword-overlap fallback over the whole FAQ collection, used when
    /// the semantic search comes back empty. Matches get an artificial
    /// moderate score.
    async fn search_faq_keywords(&self, message: &str) -> Vec<FaqMatch> {
        let entries = match self
            .store
            .scroll(&self.collections.faq, self.settings.keyword_scan_limit)
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "FAQ keyword scan failed");
                return Vec::new();
            }
        };

        let query_tokens: Vec<String> = message
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, FaqMatch)> = entries
            .into_iter()
            .filter_map(|hit| {
                let question = hit.content.to_lowercase();
                let keywords = hit
                    .metadata
                    .get("keywords")
                    .map(|k| k.to_lowercase())
                    .unwrap_or_default();
                let matches = query_tokens
                    .iter()
                    .filter(|t| keywords.contains(t.as_str()) || question.contains(t.as_str()))
                    .count();
                if matches == 0 {
                    return None;
                }
                let mut faq = faq_from_hit(hit);
                faq.score = 0.5;
                Some((matches, faq))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.settings.top_k as usize)
            .map(|(_, faq)| faq)
            .collect()
    }

    async fn search_history(&self, name: &str) -> Vec<HistoryEntry> {
        let embedding = match self.embedder.embed(&name.to_lowercase()).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "name embedding failed, history skipped");
                return Vec::new();
            }
        };

        let hits = match self
            .store
            .search(
                &self.collections.appointment,
                &embedding,
                self.settings.history_top_k,
                self.settings.score_threshold,
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "appointment history search failed");
                return Vec::new();
            }
        };

        hits.into_iter()
            .filter_map(|hit| {
                Some(HistoryEntry {
                    patient_name: hit.metadata.get("patient_name")?.clone(),
                    procedure: hit.metadata.get("procedure")?.clone(),
                    unit: hit.metadata.get("unit")?.clone(),
                    datetime: hit.metadata.get("datetime").cloned().unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn faq_from_hit(hit: SearchHit) -> FaqMatch {
    FaqMatch {
        answer: hit.metadata.get("answer").cloned().unwrap_or_default(),
        question: hit.content,
        score: hit.score,
    }
}

fn decode_slots(metadata: &HashMap<String, String>) -> SlotPatch {
    metadata
        .get("slots")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

/// Frequency counting over history entries: modal unit, modal hour,
/// distinct procedures in first-seen order.
fn infer_preferences(history: &[HistoryEntry]) -> PatientPreferences {
    let mut unit_counts: HashMap<&str, usize> = HashMap::new();
    let mut hour_counts: HashMap<String, usize> = HashMap::new();
    let mut procedures: Vec<String> = Vec::new();

    for entry in history {
        *unit_counts.entry(entry.unit.as_str()).or_default() += 1;
        if let Some(hour) = extract_hour(&entry.datetime) {
            *hour_counts.entry(hour).or_default() += 1;
        }
        if !procedures.iter().any(|p| p == &entry.procedure) {
            procedures.push(entry.procedure.clone());
        }
    }

    PatientPreferences {
        preferred_unit: modal_key(&unit_counts).map(str::to_string),
        preferred_hour: hour_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(k, _)| k.clone()),
        procedures,
    }
}

fn modal_key<'a>(counts: &HashMap<&'a str, usize>) -> Option<&'a str> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| *k)
}

/// "2026-09-01T14:30:00" -> "14:00"
fn extract_hour(datetime: &str) -> Option<String> {
    let time = datetime.split('T').nth(1)?;
    let hour = time.split(':').next()?;
    if hour.len() == 2 && hour.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{}:00", hour))
    } else {
        None
    }
}
