//! Text embedding backends.

use crate::RagError;
use async_trait::async_trait;
use booking_agent_config::{EmbeddingSettings, LlmSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The seam between retrieval and an embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Batch embedding. The default loops; providers with a batch API
    /// override this and chunk requests themselves.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

// ---------------------------------------------------------------------------
// OpenAI embeddings endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

/// Embedder speaking the `/embeddings` wire format. Inputs are truncated
/// to the configured byte cap before leaving the process.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    settings: EmbeddingSettings,
}

impl OpenAiEmbedder {
    pub fn new(llm: &LlmSettings, settings: EmbeddingSettings) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: llm.endpoint.trim_end_matches('/').to_string(),
            api_key: llm.api_key.clone(),
            settings,
        })
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        let cap = self.settings.max_text_len;
        if text.len() <= cap {
            return text;
        }
        let mut end = cap;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.settings.model,
                input: inputs,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("{}: {}", status, detail)));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let input = vec![self.truncate(text).to_string()];
        let mut vectors = self.request(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.settings.batch_size.max(1)) {
            let inputs: Vec<String> =
                chunk.iter().map(|t| self.truncate(t).to_string()).collect();
            let mut vectors = self.request(&inputs).await?;
            if vectors.len() != inputs.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    vectors.len()
                )));
            }
            out.append(&mut vectors);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.settings.dimension as usize
    }
}

// ---------------------------------------------------------------------------
// Deterministic embedder for tests
// ---------------------------------------------------------------------------

/// Hash-based embedder producing stable, unit-norm vectors without any
/// network dependency. Similar texts share tokens and therefore overlap.
pub struct SimpleEmbedder {
    dimension: usize,
}

impl SimpleEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for SimpleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hash: u64 = 5381;
            for byte in token.bytes() {
                hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
            }
            let index = (hash % self.dimension as u64) as usize;
            vector[index] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simple_embedder_is_deterministic() {
        let embedder = SimpleEmbedder::new(64);
        let a = embedder.embed("book a cleaning downtown").await.unwrap();
        let b = embedder.embed("book a cleaning downtown").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn simple_embedder_normalizes() {
        let embedder = SimpleEmbedder::new(64);
        let v = embedder.embed("hello world").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn default_batch_preserves_order() {
        let embedder = SimpleEmbedder::new(32);
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("one").await.unwrap());
        assert_eq!(batch[1], embedder.embed("two").await.unwrap());
    }
}
