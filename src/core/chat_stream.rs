//! Model stream transport.
//!
//! Opens a streaming chat request and turns the SSE byte stream into
//! [`StreamEvent`]s on a channel. The network task stops on its own when the
//! receiving side goes away; cancellation never needs to abort protocol-level
//! I/O.

use async_trait::async_trait;
use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ChatRequest, ChunkDelta, StreamChunk};
use crate::error::StreamError;
use crate::utils::url::construct_api_url;

/// One increment delivered by the model stream.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Delta(ChunkDelta),
    Error(String),
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Handle one SSE payload. Returns `true` when the stream is finished.
fn handle_data_payload(payload: &str, tx: &mpsc::UnboundedSender<StreamEvent>) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(StreamEvent::End);
        return true;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            // In-stream error objects parse as chunks too; they abort the
            // round-trip instead of being treated as empty deltas.
            if chunk.error.is_some() {
                let _ = tx.send(StreamEvent::Error(format_api_error(payload)));
                let _ = tx.send(StreamEvent::End);
                return true;
            }
            if let Some(delta) = chunk.delta {
                let _ = tx.send(StreamEvent::Delta(delta));
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            let formatted_error = format_api_error(payload);
            let _ = tx.send(StreamEvent::Error(formatted_error));
            let _ = tx.send(StreamEvent::End);
            true
        }
    }
}

fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<StreamEvent>) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx))
        .unwrap_or(false)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Format an API error body for the user-visible error channel.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

/// Source of model streams. The engine only sees this trait, which keeps the
/// recursive tool loop testable against a scripted client.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn open_stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, StreamError>;
}

/// Streaming client for the hosted chat API.
#[derive(Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpModelClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn open_stream(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, StreamError> {
        let chat_url = construct_api_url(&self.base_url, "chat/stream");
        let response = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(StreamError::Api(format_api_error(&error_text)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                if tx.is_closed() {
                    // Receiver dropped: the engine cancelled or finished.
                    return;
                }

                let chunk_bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(format_api_error(&e.to_string())));
                        let _ = tx.send(StreamEvent::End);
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk_bytes);

                while let Some(newline_pos) = memchr(b'\n', &buffer) {
                    let line_str = match std::str::from_utf8(&buffer[..newline_pos]) {
                        Ok(s) => s.trim(),
                        Err(e) => {
                            debug!(error = %e, "invalid UTF-8 in stream");
                            buffer.drain(..=newline_pos);
                            continue;
                        }
                    };

                    let should_end = process_sse_line(line_str, &tx);
                    buffer.drain(..=newline_pos);
                    if should_end {
                        return;
                    }
                }
            }

            let _ = tx.send(StreamEvent::End);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let variants = [
            (
                r#"data: {"delta":{"text":"Hello"}}"#,
                "Hello",
                "data: [DONE]",
            ),
            (
                r#"data:{"delta":{"text":"World"}}"#,
                "World",
                "data:[DONE]",
            ),
        ];

        for (chunk_line, expected_text, done_line) in variants {
            let (tx, mut rx) = mpsc::unbounded_channel();

            assert!(!process_sse_line(chunk_line, &tx));
            match rx.try_recv().expect("expected delta event") {
                StreamEvent::Delta(delta) => assert_eq!(delta.text.as_deref(), Some(expected_text)),
                other => panic!("expected delta event, got {:?}", other),
            }

            assert!(process_sse_line(done_line, &tx));
            assert!(matches!(rx.try_recv().expect("expected end"), StreamEvent::End));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn process_sse_line_surfaces_tool_calls() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let line = r#"data: {"delta":{"tool_calls":[{"name":"web_search","args":{"query":"rust"}}]}}"#;

        assert!(!process_sse_line(line, &tx));
        match rx.try_recv().expect("expected delta event") {
            StreamEvent::Delta(delta) => {
                assert!(delta.text.is_none());
                assert_eq!(delta.tool_calls.len(), 1);
                assert_eq!(delta.tool_calls[0].name, "web_search");
            }
            other => panic!("expected delta event, got {:?}", other),
        }
    }

    #[test]
    fn process_sse_line_routes_stream_errors() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let error_line = r#"data: {"error":{"message":"internal server error"}}"#;

        assert!(process_sse_line(error_line, &tx));

        match rx.try_recv().expect("expected error event") {
            StreamEvent::Error(text) => {
                let expected = r#"API Error: internal server error
```json
{
  "error": {
    "message": "internal server error"
  }
}
```"#;
                assert_eq!(text, expected);
            }
            other => panic!("expected error event, got {:?}", other),
        }

        assert!(matches!(rx.try_recv().expect("expected end"), StreamEvent::End));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn string_form_error_payloads_are_routed_too() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(process_sse_line(r#"data: {"error":"rate limited"}"#, &tx));

        match rx.try_recv().expect("expected error event") {
            StreamEvent::Error(text) => assert!(text.contains("rate limited")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert!(matches!(rx.try_recv().expect("expected end"), StreamEvent::End));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!process_sse_line("event: ping", &tx));
        assert!(!process_sse_line("", &tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn format_api_error_prettifies_json_with_summary() {
        let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
        let formatted = format_api_error(raw);

        let expected = r#"API Error: model overloaded
```json
{
  "error": {
    "message": "model overloaded",
    "type": "invalid_request_error"
  }
}
```"#;
        assert_eq!(formatted, expected);
    }

    #[test]
    fn format_api_error_handles_xml_and_plaintext() {
        let xml = "<error>bad</error>";
        let plain = "api failure";

        assert_eq!(
            format_api_error(xml),
            "API Error:\n```xml\n<error>bad</error>\n```"
        );
        assert_eq!(format_api_error(plain), "API Error:\n```\napi failure\n```");
    }
}
