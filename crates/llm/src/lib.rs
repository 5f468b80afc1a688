//! LLM integration.
//!
//! [`LlmBackend`] is the seam the agent crate talks through; the shipped
//! implementation speaks the OpenAI chat-completions protocol including the
//! native tools API. Tests use scripted backends instead of the wire.

pub mod backend;
pub mod tools;

pub use backend::{
    GenerationRequest, GenerationResult, LlmBackend, OpenAiBackend, TokenUsage, ToolInvocation,
};
pub use tools::{ToolBuilder, ToolDefinition};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("LLM request exhausted {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}
