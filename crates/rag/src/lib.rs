//! Retrieval-augmented context for the booking agent.
//!
//! Three logical collections back the retriever: FAQ entries, prior
//! conversations, and per-patient appointment history. Embeddings flow
//! through a bounded cache so repeated queries never hit the upstream
//! embedding provider twice.

pub mod cache;
pub mod embeddings;
pub mod indexer;
pub mod retriever;
pub mod sync;
pub mod vector_store;

pub use cache::{CacheStats, CachingEmbedder, EmbeddingCache};
pub use embeddings::{Embedder, OpenAiEmbedder, SimpleEmbedder};
pub use indexer::{FaqEntry, FaqIndexer, IndexReport};
pub use retriever::{
    CollectionNames, ContextRetriever, ConversationMatch, FaqMatch, HistoryEntry,
    PatientPreferences, RagContext, VectorSearch,
};
pub use sync::{
    AppointmentSync, ArchivedConversation, BookedAppointment, ConversationArchiver,
    ConversationOutcome,
};
pub use vector_store::{Document, SearchHit, VectorStore, VectorStoreConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store connection failed: {0}")]
    Connection(String),

    #[error("vector store operation failed: {0}")]
    VectorStore(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("FAQ indexing failed: {0}")]
    Index(String),
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Embedding(err.to_string())
    }
}
