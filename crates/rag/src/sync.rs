//! Long-term memory writes.
//!
//! Two writers feed the retrieval collections after the fact: a completed
//! booking goes into the appointment collection so future conversations can
//! recall the patient's history, and a finished conversation goes into the
//! conversation collection with its final slots and outcome so the
//! extraction fallback has real prior turns to match against. Both writes
//! run as spawned tasks off the response path and are never awaited by the
//! caller; failures are logged and dropped.

use crate::embeddings::Embedder;
use crate::vector_store::{Document, VectorStore};
use booking_agent_core::SlotSet;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A completed booking, as recorded into history.
#[derive(Debug, Clone)]
pub struct BookedAppointment {
    pub patient_name: String,
    pub procedure: String,
    pub unit: String,
    /// Combined "YYYY-MM-DDTHH:MM:SS".
    pub datetime: String,
}

impl BookedAppointment {
    /// Text embedded for similarity search by patient name.
    pub fn embedding_text(&self) -> String {
        format!("{} {} {}", self.patient_name, self.procedure, self.unit).to_lowercase()
    }

    pub fn into_document(self) -> Document {
        let mut metadata = HashMap::new();
        metadata.insert("patient_name".to_string(), self.patient_name.clone());
        metadata.insert("procedure".to_string(), self.procedure.clone());
        metadata.insert("unit".to_string(), self.unit.clone());
        metadata.insert("datetime".to_string(), self.datetime.clone());
        Document {
            id: Uuid::new_v4().to_string(),
            content: self.embedding_text(),
            metadata,
        }
    }
}

pub struct AppointmentSync {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl AppointmentSync {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Spawn the history write and return immediately.
    pub fn record(&self, appointment: BookedAppointment) {
        let store = Arc::clone(&self.store);
        let embedder = Arc::clone(&self.embedder);
        tokio::spawn(async move {
            let text = appointment.embedding_text();
            let embedding = match embedder.embed(&text).await {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(error = %err, "appointment sync: embedding failed");
                    return;
                }
            };
            let collection = store.appointment_collection().to_string();
            let document = appointment.into_document();
            if let Err(err) = store.upsert(&collection, &[document], &[embedding]).await {
                tracing::warn!(error = %err, "appointment sync: upsert failed");
            } else {
                tracing::debug!("appointment recorded into history collection");
            }
        });
    }
}

/// How a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationOutcome {
    /// Booking created.
    Completed,
    /// Handed off to a human.
    Fallback,
}

impl ConversationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationOutcome::Completed => "completed",
            ConversationOutcome::Fallback => "fallback",
        }
    }
}

/// A finished conversation, as recorded into long-term memory.
#[derive(Debug, Clone)]
pub struct ArchivedConversation {
    pub session_id: String,
    /// Transcript rendered "role: text" per line; this is what gets
    /// embedded.
    pub transcript: String,
    pub slots: SlotSet,
    pub outcome: ConversationOutcome,
    pub sentiment: String,
}

impl ArchivedConversation {
    pub fn into_document(self) -> Document {
        // the slots payload is the schema the retriever decodes back
        // into a SlotPatch
        let slots = serde_json::to_string(&self.slots).unwrap_or_else(|_| "{}".to_string());
        let mut metadata = HashMap::new();
        metadata.insert("session_id".to_string(), self.session_id.clone());
        metadata.insert("slots".to_string(), slots);
        metadata.insert("outcome".to_string(), self.outcome.as_str().to_string());
        metadata.insert("sentiment".to_string(), self.sentiment);
        metadata.insert("timestamp".to_string(), Utc::now().to_rfc3339());
        Document {
            // stable per session, a later archive overwrites the earlier one
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, self.session_id.as_bytes()).to_string(),
            content: self.transcript,
            metadata,
        }
    }
}

pub struct ConversationArchiver {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl ConversationArchiver {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Spawn the archive write and return immediately.
    pub fn archive(&self, conversation: ArchivedConversation) {
        let store = Arc::clone(&self.store);
        let embedder = Arc::clone(&self.embedder);
        tokio::spawn(async move {
            let embedding = match embedder.embed(&conversation.transcript).await {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(error = %err, "conversation archive: embedding failed");
                    return;
                }
            };
            let outcome = conversation.outcome;
            let collection = store.conversation_collection().to_string();
            let document = conversation.into_document();
            if let Err(err) = store.upsert(&collection, &[document], &[embedding]).await {
                tracing::warn!(error = %err, "conversation archive: upsert failed");
            } else {
                tracing::debug!(outcome = outcome.as_str(), "conversation archived");
            }
        });
    }
}
