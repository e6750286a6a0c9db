//! Tool dispatch.
//!
//! The dispatcher maps a model-requested tool call onto one of the three
//! built-in executors and wraps every outcome — success, executor failure,
//! missing argument, unknown tool — in a uniform result envelope. From the
//! caller's perspective [`Toolbox::dispatch`] is a total function: tool
//! failures never abort the conversation.

pub mod calc;
pub mod search;
pub mod webpage;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ToolError;

/// A structured request emitted by the model asking the client to execute a
/// named capability with arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Uniform result envelope fed back to the model. The response mapping
/// echoes at least one input field alongside a `content` field holding the
/// success value or the error text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(rename = "name")]
    pub tool_name: String,
    pub response: Map<String, Value>,
}

impl ToolResult {
    fn new(tool_name: &str, echo_key: &str, echo_value: Value, content: String) -> Self {
        let mut response = Map::new();
        response.insert(echo_key.to_string(), echo_value);
        response.insert("content".to_string(), Value::String(content));
        Self {
            tool_name: tool_name.to_string(),
            response,
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.response.get("content").and_then(Value::as_str)
    }
}

/// Closed registry of the built-in tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    WebSearch,
    SearchWebpage,
    Calculate,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "web_search" => Some(ToolKind::WebSearch),
            "search_webpage" => Some(ToolKind::SearchWebpage),
            "calculate" => Some(ToolKind::Calculate),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::WebSearch => "web_search",
            ToolKind::SearchWebpage => "search_webpage",
            ToolKind::Calculate => "calculate",
        }
    }

    /// The single required string parameter each tool declares, echoed back
    /// in the result envelope.
    pub fn required_param(self) -> &'static str {
        match self {
            ToolKind::WebSearch => "query",
            ToolKind::SearchWebpage => "url",
            ToolKind::Calculate => "equation",
        }
    }

    fn failure_prefix(self) -> &'static str {
        match self {
            ToolKind::WebSearch => "Error while performing web search",
            ToolKind::SearchWebpage => "Error while searching the site",
            ToolKind::Calculate => "Error calculating the equation",
        }
    }
}

/// Settings shared by the network-backed tools.
#[derive(Debug, Clone)]
pub struct ToolboxConfig {
    /// Optional pass-through proxy prefix for outbound fetches.
    pub relay_base_url: Option<String>,
    pub search_base_url: String,
    pub search_result_limit: usize,
    pub webpage_timeout_ms: u64,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            relay_base_url: None,
            search_base_url: "https://search.neuranet-ai.com/search".to_string(),
            search_result_limit: 5,
            webpage_timeout_ms: 5_000,
        }
    }
}

/// Executor registry plus the shared HTTP client the fetchers use.
#[derive(Debug, Clone)]
pub struct Toolbox {
    client: reqwest::Client,
    config: ToolboxConfig,
}

impl Toolbox {
    pub fn new(client: reqwest::Client, config: ToolboxConfig) -> Self {
        Self { client, config }
    }

    /// Execute one tool call. Never fails past this boundary: every outcome
    /// becomes a result envelope.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(kind) = ToolKind::from_name(&call.name) else {
            debug!(tool = %call.name, "unknown tool requested");
            return ToolResult::new(
                &call.name,
                "name",
                Value::String(call.name.clone()),
                format!("No tool registered for {}", call.name),
            );
        };

        let param = kind.required_param();
        let Some(argument) = call.args.get(param).and_then(Value::as_str) else {
            let err = ToolError::MissingArgument {
                tool: kind.name(),
                param,
            };
            return ToolResult::new(
                kind.name(),
                param,
                call.args.get(param).cloned().unwrap_or(Value::Null),
                format!("{}: {}", kind.failure_prefix(), err),
            );
        };

        debug!(tool = kind.name(), argument, "dispatching tool call");
        let outcome = match kind {
            ToolKind::WebSearch => {
                search::web_search(&self.client, &self.config, argument).await
            }
            ToolKind::SearchWebpage => {
                webpage::fetch_webpage_text(&self.client, &self.config, argument).await
            }
            ToolKind::Calculate => calc::evaluate(argument).map_err(ToolError::from),
        };

        let content = match outcome {
            Ok(text) => text,
            Err(err) => format!("{}: {}", kind.failure_prefix(), err),
        };
        ToolResult::new(
            kind.name(),
            param,
            Value::String(argument.to_string()),
            content,
        )
    }
}

/// Human-readable summary of a batch of tool calls, shown in the visible
/// output while the calls run.
///
/// Underscores become spaces, words are capitalized unless purely numeric,
/// non-empty arguments are listed as `(key: value, ...)`, and multiple calls
/// are joined with `", "`.
pub fn format_tool_call_names(calls: &[ToolCall]) -> String {
    calls
        .iter()
        .filter(|call| !call.name.is_empty())
        .map(|call| {
            let formatted_name = call
                .name
                .split('_')
                .map(|word| {
                    if word.parse::<f64>().is_ok() {
                        word.to_string()
                    } else {
                        let mut chars = word.chars();
                        match chars.next() {
                            Some(first) => first.to_uppercase().chain(chars).collect(),
                            None => String::new(),
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");

            let formatted_args = call
                .args
                .iter()
                .map(|(key, value)| match value {
                    Value::String(s) => format!("{key}: {s}"),
                    other => format!("{key}: {other}"),
                })
                .collect::<Vec<_>>()
                .join(", ");

            if formatted_args.is_empty() {
                formatted_name
            } else {
                format!("{formatted_name} ({formatted_args})")
            }
        })
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: &[(&str, Value)]) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            args: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn formats_tool_names_with_capitalized_words() {
        let calls = [call("search_webpage", &[])];
        assert_eq!(format_tool_call_names(&calls), "Search Webpage");
    }

    #[test]
    fn formats_args_after_name() {
        let calls = [call("search_webpage", &[("url", json!("x"))])];
        assert_eq!(format_tool_call_names(&calls), "Search Webpage (url: x)");
    }

    #[test]
    fn numeric_words_keep_their_case() {
        let calls = [call("web_search_2", &[])];
        assert_eq!(format_tool_call_names(&calls), "Web Search 2");
    }

    #[test]
    fn joins_multiple_calls_with_commas() {
        let calls = [
            call("web_search", &[("query", json!("rust"))]),
            call("calculate", &[("equation", json!("1+1"))]),
        ];
        assert_eq!(
            format_tool_call_names(&calls),
            "Web Search (query: rust), Calculate (equation: 1+1)"
        );
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_tool_with_envelope() {
        let toolbox = Toolbox::new(reqwest::Client::new(), ToolboxConfig::default());
        let result = toolbox.dispatch(&call("take_screenshot", &[])).await;

        assert_eq!(result.tool_name, "take_screenshot");
        assert_eq!(
            result.content(),
            Some("No tool registered for take_screenshot")
        );
        assert_eq!(
            result.response.get("name"),
            Some(&json!("take_screenshot"))
        );
    }

    #[tokio::test]
    async fn dispatch_reports_missing_required_argument() {
        let toolbox = Toolbox::new(reqwest::Client::new(), ToolboxConfig::default());
        let result = toolbox.dispatch(&call("web_search", &[])).await;

        assert_eq!(result.tool_name, "web_search");
        let content = result.content().unwrap();
        assert!(content.starts_with("Error while performing web search:"));
        assert!(content.contains("`query`"));
    }

    #[tokio::test]
    async fn dispatch_runs_calculator_and_echoes_equation() {
        let toolbox = Toolbox::new(reqwest::Client::new(), ToolboxConfig::default());
        let result = toolbox
            .dispatch(&call("calculate", &[("equation", json!("12 / (2.3 + 0.7)"))]))
            .await;

        assert_eq!(result.tool_name, "calculate");
        assert_eq!(result.content(), Some("4"));
        assert_eq!(
            result.response.get("equation"),
            Some(&json!("12 / (2.3 + 0.7)"))
        );
    }

    #[tokio::test]
    async fn dispatch_folds_calculator_failure_into_envelope() {
        let toolbox = Toolbox::new(reqwest::Client::new(), ToolboxConfig::default());
        let result = toolbox
            .dispatch(&call("calculate", &[("equation", json!("bad((("))]))
            .await;

        let content = result.content().unwrap();
        assert!(content.starts_with("Error calculating the equation:"));
        assert!(!content.trim_end_matches(':').is_empty());
    }
}
