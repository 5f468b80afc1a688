//! LLM backend trait and the OpenAI chat-completions implementation.

use crate::tools::ToolDefinition;
use crate::LlmError;
use async_trait::async_trait;
use booking_agent_core::Turn;
use booking_agent_config::LlmSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One generation request: system instruction, transcript, optional tools.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            system: system.into(),
            turns,
            tools: Vec::new(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A tool invocation requested by the model. The name is the raw wire
/// string; resolution to a known function happens at the dispatch layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Result of one generation call.
///
/// `text` may accompany `tool_calls`; callers decide which to trust. The
/// orchestrator discards text whenever calls are present.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub usage: TokenUsage,
}

impl GenerationResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The seam between the agent and a language-model provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, LlmError>;

    /// Backend identifier for logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// OpenAI chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON object encoded as a string, per the OpenAI wire format.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Chat-completions backend with bounded retry.
///
/// Retries transport errors and 5xx responses with exponential backoff;
/// 4xx responses fail immediately since repeating them cannot help.
pub struct OpenAiBackend {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl OpenAiBackend {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.settings.endpoint.trim_end_matches('/'))
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<GenerationResult, LlmError> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &request.system,
        });
        for turn in &request.turns {
            messages.push(ChatMessage {
                role: turn.role.as_str(),
                content: &turn.text,
            });
        }

        let body = ChatRequest {
            model: &self.settings.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(|t| t.to_wire()).collect(),
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(LlmError::Request(format!("upstream {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::InvalidResponse(format!("{}: {}", status, detail)));
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::Null);
            tool_calls.push(ToolInvocation {
                name: call.function.name,
                arguments,
            });
        }

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(GenerationResult {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, LlmError> {
        let mut backoff = Duration::from_millis(self.settings.initial_backoff_ms);
        let attempts = self.settings.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(request).await {
                Ok(result) => {
                    tracing::debug!(
                        model = %self.settings.model,
                        attempt,
                        tool_calls = result.tool_calls.len(),
                        completion_tokens = result.usage.completion_tokens,
                        "generation complete"
                    );
                    return Ok(result);
                }
                Err(LlmError::InvalidResponse(message)) => {
                    return Err(LlmError::InvalidResponse(message));
                }
                Err(err) => {
                    last_error = err.to_string();
                    tracing::warn!(attempt, max = attempts, error = %last_error, "LLM attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}
