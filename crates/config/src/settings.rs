//! Application settings.
//!
//! Every section derives `Deserialize` with `#[serde(default)]` so partial
//! YAML files and sparse env overrides compose cleanly. `validate()` runs
//! once at startup and rejects out-of-range values with the offending field
//! name.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub qdrant: QdrantSettings,
    pub backend: BackendSettings,
    pub session: SessionSettings,
    pub rag: RagSettings,
    pub detection: DetectionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Applied to every inbound request via tower-http.
    pub request_timeout_secs: u64,
    pub log_json: bool,
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 60,
            log_json: false,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub endpoint: String,
    /// Read from config or the BOOKING_AGENT_LLM__API_KEY env override.
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    /// Lower temperature used for structured slot extraction.
    pub extraction_temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            extraction_temperature: 0.1,
            max_tokens: 1024,
            timeout_secs: 30,
            max_retries: 2,
            initial_backoff_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimension: u64,
    pub cache_capacity: usize,
    /// Batch upserts chunk texts into groups of this size.
    pub batch_size: usize,
    /// Cache keys and embedding inputs are truncated to this many bytes.
    pub max_text_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            cache_capacity: 100,
            batch_size: 25,
            max_text_len: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub faq_collection: String,
    pub conversation_collection: String,
    pub appointment_collection: String,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6333".to_string(),
            api_key: None,
            faq_collection: "faq_embeddings".to_string(),
            conversation_collection: "conversation_history".to_string(),
            appointment_collection: "appointment_history".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    /// How often the procedure and unit catalogs are re-fetched.
    pub catalog_refresh_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 15,
            catalog_refresh_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Idle sessions past this age are removed by the sweep.
    pub timeout_minutes: u64,
    pub sweep_interval_secs: u64,
    /// Sliding-window size of the per-session message buffer.
    pub buffer_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_minutes: 30,
            sweep_interval_secs: 300,
            buffer_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub top_k: u64,
    pub score_threshold: f32,
    /// FAQ search runs with a looser threshold than conversation search.
    pub faq_threshold: f32,
    pub history_top_k: u64,
    pub keyword_scan_limit: u32,
    /// FAQ source file indexed into the FAQ collection.
    pub faq_path: String,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.7,
            faq_threshold: 0.3,
            history_top_k: 10,
            keyword_scan_limit: 100,
            faq_path: "data/faq.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Extractions below this confidence leave stored slots untouched.
    pub low_confidence: f32,
    /// Extractions at or above this confidence are trusted by the scenario
    /// detector. Inside the (low, high) band, secondary signals decide.
    pub high_confidence: f32,
    pub max_fallbacks: u32,
    pub max_messages_without_name: usize,
    pub max_suggestions: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            low_confidence: 0.3,
            high_confidence: 0.5,
            max_fallbacks: 3,
            max_messages_without_name: 10,
            max_suggestions: 3,
        }
    }
}

impl Settings {
    /// Reject values that would misbehave silently at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: "must be within [0.0, 2.0]".to_string(),
            });
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.dimension".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.embedding.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.cache_capacity".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.session.timeout_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.timeout_minutes".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.session.buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.buffer_size".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.detection.low_confidence)
            || !(0.0..=1.0).contains(&self.detection.high_confidence)
            || self.detection.low_confidence > self.detection.high_confidence
        {
            return Err(ConfigError::InvalidValue {
                field: "detection".to_string(),
                message: "confidence band must satisfy 0 <= low <= high <= 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.rag.score_threshold)
            || !(0.0..=1.0).contains(&self.rag.faq_threshold)
        {
            return Err(ConfigError::InvalidValue {
                field: "rag".to_string(),
                message: "score thresholds must be within [0.0, 1.0]".to_string(),
            });
        }
        Ok(())
    }
}

/// Load layered settings.
///
/// `env` selects an overlay file, e.g. `Some("production")` reads
/// `config/production.yaml` on top of `config/default.yaml`. Missing files
/// are fine. Env vars use the `BOOKING_AGENT_` prefix with `__` as the
/// section separator (`BOOKING_AGENT_LLM__API_KEY`).
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false));

    if let Some(env) = env {
        builder = builder
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
    }

    let raw = builder
        .add_source(
            config::Environment::with_prefix("BOOKING_AGENT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = raw.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
