//! Wire payloads exchanged with the streaming model API.
//!
//! The API accepts an ordered history of `{role, parts}` messages (two roles
//! only) plus tool declarations, and answers with an SSE stream of chunks,
//! each optionally carrying a text delta and/or a batch of complete tool-call
//! requests.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::message::{ContentPart, Turn};
use crate::tools::ToolCall;

/// One model-visible history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiMessage {
    pub role: String,
    pub parts: Vec<ContentPart>,
}

impl ApiMessage {
    pub fn from_turn(turn: &Turn) -> Self {
        Self {
            role: turn.role.api_role().to_string(),
            parts: turn.parts.clone(),
        }
    }
}

/// Streaming chat request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    pub messages: Vec<ApiMessage>,
    pub tools: Vec<ToolDeclaration>,
    pub stream: bool,
}

/// Declaration of one callable tool: name, model-facing description, and a
/// JSON-schema parameter contract with required fields.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One parsed SSE chunk payload. A chunk carries either a delta or an
/// in-stream error object; an error aborts the round-trip.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Incremental content carried by one chunk. Tool calls arrive complete,
/// never as partial argument fragments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// The fixed registry of declared tools.
pub fn builtin_tool_declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: "web_search".to_string(),
            description: "Search the internet to find up-to-date information on a given topic."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The query to search for."
                    }
                },
                "required": ["query"]
            }),
        },
        ToolDeclaration {
            name: "search_webpage".to_string(),
            description: "Returns a string with all the content of a webpage. Some websites \
                          block this, so try a few different websites."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL of the site to search."
                    }
                },
                "required": ["url"]
            }),
        },
        ToolDeclaration {
            name: "calculate".to_string(),
            description: "Calculates a given mathematical equation and returns the result. Use \
                          this for calculations when writing responses. Examples: '12 / (2.3 + \
                          0.7)' -> '4', '12.7 cm to inch' -> '5 inch', 'sin(45 deg) ^ 2' -> \
                          '0.5', '9 / 3 + 2i' -> '3 + 2i', 'det([-1, 2; 3, 1])' -> '-7'"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "equation": {
                        "type": "string",
                        "description": "The equation to be calculated."
                    }
                },
                "required": ["equation"]
            }),
        },
    ]
}
