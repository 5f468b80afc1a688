//! Tool definitions handed to the LLM.
//!
//! Definitions are plain JSON-schema objects built through a small fluent
//! builder, serialized into the `tools` array of a chat-completions request.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A named function the LLM may request, with a JSON-schema parameter
/// description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Wire shape for the OpenAI `tools` array.
    pub fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Fluent builder for [`ToolDefinition`].
#[derive(Debug)]
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }

    /// Add a string parameter.
    pub fn string(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({"type": "string", "description": description}),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn build(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            parameters: json!({
                "type": "object",
                "properties": Value::Object(self.properties),
                "required": self.required,
            }),
        }
    }
}
