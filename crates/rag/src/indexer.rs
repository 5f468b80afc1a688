//! FAQ indexing.
//!
//! FAQ entries live in a JSON file curated by the clinic. Indexing embeds
//! each entry and upserts it into the FAQ collection with the payload the
//! retriever reads: the question as the point text, answer, category and
//! keywords as metadata. Point ids are derived from the entry id, so a
//! reindex overwrites entries in place instead of duplicating them.

use crate::embeddings::Embedder;
use crate::vector_store::{Document, VectorStore};
use crate::RagError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// One entry of the FAQ source file.
#[derive(Debug, Clone, Deserialize)]
pub struct FaqEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl FaqEntry {
    /// Text the embedding is computed from. Question, answer and keywords
    /// all contribute so a query can match either side of an entry.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{} {}", self.question, self.answer);
        if !self.keywords.is_empty() {
            text.push(' ');
            text.push_str(&self.keywords.join(" "));
        }
        text
    }

    pub fn into_document(self) -> Document {
        let mut metadata = HashMap::new();
        metadata.insert("faq_id".to_string(), self.id.clone());
        metadata.insert("answer".to_string(), self.answer);
        metadata.insert("category".to_string(), self.category);
        metadata.insert("keywords".to_string(), self.keywords.join(", "));
        Document {
            // stable per entry id, reindexing overwrites
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, self.id.as_bytes()).to_string(),
            content: self.question,
            metadata,
        }
    }
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
}

pub struct FaqIndexer {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
}

impl FaqIndexer {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            embedder,
            path: path.into(),
        }
    }

    pub async fn load_entries(&self) -> Result<Vec<FaqEntry>, RagError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RagError::Index(format!("reading {}: {}", self.path.display(), e))
        })?;
        parse_entries(&raw)
    }

    /// Load, embed and upsert the whole FAQ file.
    pub async fn reindex(&self) -> Result<IndexReport, RagError> {
        let entries = self.load_entries().await?;
        if entries.is_empty() {
            tracing::warn!(path = %self.path.display(), "FAQ file is empty, nothing indexed");
            return Ok(IndexReport::default());
        }

        let texts: Vec<String> = entries.iter().map(FaqEntry::embedding_text).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let documents: Vec<Document> = entries.into_iter().map(FaqEntry::into_document).collect();
        let indexed = documents.len();
        let collection = self.store.faq_collection().to_string();
        self.store.upsert(&collection, &documents, &embeddings).await?;

        tracing::info!(indexed, collection = %collection, "FAQ collection reindexed");
        Ok(IndexReport { indexed })
    }
}

fn parse_entries(raw: &str) -> Result<Vec<FaqEntry>, RagError> {
    serde_json::from_str(raw).map_err(|e| RagError::Index(format!("invalid FAQ file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_parse_with_optional_keywords() {
        let raw = r#"[
            {"id": "faq-1", "question": "What are your opening hours?",
             "answer": "Mon-Fri 8:00 to 18:00.", "category": "general",
             "keywords": ["hours", "open"]},
            {"id": "faq-2", "question": "Do you take walk-ins?",
             "answer": "Appointments only.", "category": "booking"}
        ]"#;
        let entries = parse_entries(raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].keywords, vec!["hours", "open"]);
        assert!(entries[1].keywords.is_empty());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let raw = r#"[{"id": "faq-1", "question": "No answer here", "category": "general"}]"#;
        assert!(parse_entries(raw).is_err());
    }

    #[test]
    fn document_payload_matches_retrieval_schema() {
        let entry = FaqEntry {
            id: "faq-1".into(),
            question: "Where can I park?".into(),
            answer: "Free parking behind the building.".into(),
            category: "general".into(),
            keywords: vec!["parking".into(), "car".into()],
        };
        let doc = entry.into_document();
        assert_eq!(doc.content, "Where can I park?");
        assert_eq!(doc.metadata.get("answer").unwrap(), "Free parking behind the building.");
        assert_eq!(doc.metadata.get("keywords").unwrap(), "parking, car");
        assert_eq!(doc.metadata.get("category").unwrap(), "general");
    }

    #[test]
    fn point_id_is_stable_per_entry() {
        let entry = |id: &str| FaqEntry {
            id: id.into(),
            question: "q".into(),
            answer: "a".into(),
            category: "c".into(),
            keywords: vec![],
        };
        let a = entry("faq-1").into_document();
        let b = entry("faq-1").into_document();
        let c = entry("faq-2").into_document();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn embedding_text_spans_question_answer_and_keywords() {
        let entry = FaqEntry {
            id: "faq-1".into(),
            question: "Do you accept insurance?".into(),
            answer: "Yes, most major plans.".into(),
            category: "billing".into(),
            keywords: vec!["insurance".into()],
        };
        let text = entry.embedding_text();
        assert!(text.contains("accept insurance"));
        assert!(text.contains("major plans"));
        assert!(text.ends_with("insurance"));
    }
}
