//! Configuration loading for the booking agent.
//!
//! Priority: environment variables > `config/{env}.yaml` >
//! `config/default.yaml` > built-in defaults.

pub mod settings;

pub use settings::{
    load_settings, BackendSettings, DetectionSettings, EmbeddingSettings, LlmSettings,
    QdrantSettings, RagSettings, ServerSettings, SessionSettings, Settings,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
