//! Conversation orchestrator for the booking agent.
//!
//! Everything between "user message arrives" and "assistant text leaves"
//! lives here: session memory with expiry sweep, slot extraction with a
//! retrieval fallback, scenario detection, the proactivity engine that
//! bypasses the LLM for known-correct calls, and the response synthesizer
//! that never fabricates domain facts.

pub mod extractor;
pub mod fallback;
pub mod memory;
pub mod orchestrator;
pub mod preload;
pub mod proactive;
pub mod prompt;
pub mod scenario;
pub mod suggestions;
pub mod synthesizer;
pub mod validation;

pub use extractor::{ExtractionResult, SlotExtractor};
pub use fallback::FallbackDetector;
pub use memory::{
    start_sweep_task, ContextPatch, InMemorySessionStore, Sentiment, Session, SessionContext,
    SessionStore,
};
pub use orchestrator::Orchestrator;
pub use preload::{start_refresh_task, Catalogs, DataPreload};
pub use proactive::forced_calls;
pub use scenario::{detect_scenario, is_explicit_confirmation, is_explicit_denial, ScenarioInputs};
pub use suggestions::closest_times;
pub use synthesizer::{ExecutedCall, ResponseSynthesizer, SynthesisResult};
pub use validation::{ValidationOutcome, ValidationService};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("core error: {0}")]
    Core(#[from] booking_agent_core::CoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] booking_agent_llm::LlmError),

    #[error("retrieval error: {0}")]
    Rag(#[from] booking_agent_rag::RagError),
}
