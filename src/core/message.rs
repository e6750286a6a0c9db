use serde::{Deserialize, Serialize};

use crate::api::ApiMessage;
use crate::tools::{ToolCall, ToolResult};

/// Attribution for one transcript entry.
///
/// The remote API knows only two roles (user-origin and model-origin); the
/// transcript keeps the richer set and [`Role::api_role`] performs the
/// projection. `Model` turns hold intermediate tool-call requests, while the
/// single `Assistant` turn closing a round-trip holds the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Model,
    Tool,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::Tool => "tool",
            Role::Assistant => "assistant",
        }
    }

    /// Wire role submitted to the model API. Tool results travel as
    /// user-origin content, assistant text as model-origin content.
    pub fn api_role(self) -> &'static str {
        match self {
            Role::User | Role::Tool => "user",
            Role::Model | Role::Assistant => "model",
        }
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            "tool" => Ok(Role::Tool),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid transcript role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One structured piece of turn content.
///
/// The serde representation is the wire shape the model API expects, so
/// transcript projection is a pass-through for parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text(String),

    #[serde(rename = "inline_data")]
    Attachment {
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },

    #[serde(rename = "function_call")]
    ToolCallRequest(ToolCall),

    #[serde(rename = "function_response")]
    ToolCallResult(ToolResult),
}

impl ContentPart {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Turn {
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Self {
        Self { role, parts }
    }

    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self::new(Role::User, parts)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::Text(text.into())])
    }

    pub fn tool_requests(calls: Vec<ToolCall>) -> Self {
        Self::new(
            Role::Model,
            calls.into_iter().map(ContentPart::ToolCallRequest).collect(),
        )
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::new(
            Role::User,
            results
                .into_iter()
                .map(ContentPart::ToolCallResult)
                .collect(),
        )
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Append-only, ordered log of turns for one session.
///
/// Exclusively owned by the engine's caller; the engine reads it through
/// [`Transcript::api_history`] and mutates it only via [`Transcript::commit`],
/// which appends a whole round-trip batch at once. There is no removal API.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Append one round-trip's worth of turns as a single ordered batch.
    pub fn commit(&mut self, batch: Vec<Turn>) {
        self.turns.extend(batch);
    }

    /// Model-visible view: role remap, content pass-through.
    pub fn api_history(&self) -> Vec<ApiMessage> {
        self.turns.iter().map(ApiMessage::from_turn).collect()
    }
}
