//! Qdrant-backed vector store spanning the three retrieval collections.

use crate::RagError;
use booking_agent_config::{EmbeddingSettings, QdrantSettings};
use qdrant_client::{
    qdrant::{
        value::Kind, CreateCollectionBuilder, Distance, PointStruct, ScrollPointsBuilder,
        SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Store configuration: endpoint plus the three logical collection names.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub dimension: u64,
    pub faq_collection: String,
    pub conversation_collection: String,
    pub appointment_collection: String,
}

impl VectorStoreConfig {
    pub fn from_settings(qdrant: &QdrantSettings, embedding: &EmbeddingSettings) -> Self {
        Self {
            endpoint: qdrant.endpoint.clone(),
            api_key: qdrant.api_key.clone(),
            dimension: embedding.dimension,
            faq_collection: qdrant.faq_collection.clone(),
            conversation_collection: qdrant.conversation_collection.clone(),
            appointment_collection: qdrant.appointment_collection.clone(),
        }
    }
}

/// A stored document: text content plus flat string metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A scored (or scrolled, score 0) point returned from a collection.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

/// Vector store client.
pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl VectorStore {
    pub async fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn faq_collection(&self) -> &str {
        &self.config.faq_collection
    }

    pub fn conversation_collection(&self) -> &str {
        &self.config.conversation_collection
    }

    pub fn appointment_collection(&self) -> &str {
        &self.config.appointment_collection
    }

    /// Create any missing collection. Called once at startup.
    pub async fn ensure_collections(&self) -> Result<(), RagError> {
        for collection in [
            self.config.faq_collection.clone(),
            self.config.conversation_collection.clone(),
            self.config.appointment_collection.clone(),
        ] {
            let exists = self
                .client
                .collection_exists(&collection)
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
            if !exists {
                self.client
                    .create_collection(
                        CreateCollectionBuilder::new(&collection).vectors_config(
                            VectorParamsBuilder::new(self.config.dimension, Distance::Cosine),
                        ),
                    )
                    .await
                    .map_err(|e| RagError::VectorStore(e.to_string()))?;
                tracing::info!(collection = %collection, "created vector collection");
            }
        }
        Ok(())
    }

    pub async fn upsert(
        &self,
        collection: &str,
        documents: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<(), RagError> {
        if documents.len() != embeddings.len() {
            return Err(RagError::VectorStore(
                "document and embedding count mismatch".to_string(),
            ));
        }

        let points: Vec<PointStruct> = documents
            .iter()
            .zip(embeddings.iter())
            .map(|(doc, emb)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("text".to_string(), doc.content.clone().into());
                for (k, v) in &doc.metadata {
                    payload.insert(k.clone(), v.clone().into());
                }
                PointStruct::new(doc.id.clone(), emb.clone(), payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(())
    }

    /// Similarity search with a score threshold.
    pub async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, RagError> {
        let builder = SearchPointsBuilder::new(collection, query_embedding.to_vec(), top_k)
            .with_payload(true)
            .score_threshold(score_threshold);

        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let (content, metadata) = split_payload(point.payload);
                SearchHit {
                    id: point_id_string(point.id),
                    score: point.score,
                    content,
                    metadata,
                }
            })
            .collect())
    }

    /// List points without a query vector. Used by the FAQ keyword
    /// fallback; returns hits with score 0.
    pub async fn scroll(&self, collection: &str, limit: u32) -> Result<Vec<SearchHit>, RagError> {
        let results = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .limit(limit)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let (content, metadata) = split_payload(point.payload);
                SearchHit {
                    id: point_id_string(point.id),
                    score: 0.0,
                    content,
                    metadata,
                }
            })
            .collect())
    }
}

fn split_payload(
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> (String, HashMap<String, String>) {
    let mut metadata = HashMap::new();
    let mut content = String::new();
    for (k, v) in payload {
        if let Some(Kind::StringValue(s)) = v.kind {
            if k == "text" {
                content = s;
            } else {
                metadata.insert(k, s);
            }
        }
    }
    (content, metadata)
}

fn point_id_string(id: Option<qdrant_client::qdrant::PointId>) -> String {
    id.and_then(|pid| pid.point_id_options)
        .map(|options| match options {
            qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u,
            qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
        })
        .unwrap_or_default()
}
