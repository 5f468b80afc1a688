//! Bounded embedding cache.
//!
//! Keys are normalized (whitespace collapsed, trimmed, lowercased,
//! length-capped) so trivially different spellings of the same query share
//! one entry. Eviction is FIFO at capacity; insert and evict happen under
//! the same lock so the bound can never be exceeded.

use crate::embeddings::Embedder;
use crate::RagError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// Running counters, exposed for diagnostics endpoints and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Cumulative upstream latency, misses only.
    pub upstream_ms: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct CacheInner {
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
    stats: CacheStats,
}

/// FIFO cache of normalized text to embedding vector.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    max_key_len: usize,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, max_key_len: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                stats: CacheStats::default(),
            }),
            capacity,
            max_key_len,
        }
    }

    /// Collapse whitespace, trim, lowercase and cap length.
    pub fn normalize(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let lowered = collapsed.to_lowercase();
        if lowered.len() <= self.max_key_len {
            return lowered;
        }
        let mut end = self.max_key_len;
        while end > 0 && !lowered.is_char_boundary(end) {
            end -= 1;
        }
        lowered[..end].to_string()
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).cloned() {
            Some(vector) => {
                inner.stats.hits += 1;
                Some(vector)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: String, vector: Vec<f32>) {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            inner.entries.insert(key, vector);
            return;
        }
        while inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
            } else {
                break;
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, vector);
    }

    pub fn record_upstream_latency(&self, elapsed_ms: u64) {
        self.inner.lock().stats.upstream_ms += elapsed_ms;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

/// An [`Embedder`] decorator that consults the cache before the upstream
/// provider.
pub struct CachingEmbedder {
    upstream: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
}

impl CachingEmbedder {
    pub fn new(upstream: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self { upstream, cache }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let key = self.cache.normalize(text);
        if let Some(vector) = self.cache.get(&key) {
            return Ok(vector);
        }

        let started = Instant::now();
        let vector = self.upstream.embed(&key).await?;
        self.cache
            .record_upstream_latency(started.elapsed().as_millis() as u64);
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.upstream.dimension()
    }
}
