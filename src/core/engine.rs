//! Conversation engine.
//!
//! Drives one user turn end to end: open a model stream, fold text deltas
//! into the accumulating response, execute any requested tools, feed the
//! results back, and reopen the stream until the model answers without
//! asking for more tools. The transcript is only touched once, at the end,
//! with the whole round-trip batch.
//!
//! Two accumulators run side by side. The visible one feeds the render sink
//! and picks up a bullet summary for each tool batch; the canonical one holds
//! only model text and becomes the committed assistant turn.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{builtin_tool_declarations, ApiMessage, ChatRequest};
use crate::core::chat_stream::{ModelClient, StreamEvent};
use crate::core::config::Config;
use crate::core::message::{ContentPart, Transcript, Turn};
use crate::error::{StreamError, ValidationError};
use crate::tools::{format_tool_call_names, ToolCall, Toolbox};
use crate::ui::render::RenderSink;

/// The slice of [`Config`] the engine acts on.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub system_prompt: String,
    /// Consecutive tool round-trips allowed within one turn; `0` is unbounded.
    pub tool_depth_limit: usize,
    pub dedupe_tool_calls: bool,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            tool_depth_limit: config.tool_depth_limit,
            dedupe_tool_calls: config.dedupe_tool_calls,
        }
    }
}

/// Build the content parts for a user turn, rejecting empty submissions
/// before anything reaches the network.
pub fn compose_user_parts(
    text: &str,
    attachment_parts: Vec<ContentPart>,
) -> Result<Vec<ContentPart>, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() && attachment_parts.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }

    let mut parts = Vec::with_capacity(attachment_parts.len() + 1);
    if !trimmed.is_empty() {
        parts.push(ContentPart::Text(trimmed.to_string()));
    }
    parts.extend(attachment_parts);
    Ok(parts)
}

pub struct ChatEngine<C: ModelClient> {
    client: C,
    toolbox: Toolbox,
    settings: EngineSettings,
}

impl<C: ModelClient> ChatEngine<C> {
    pub fn new(client: C, toolbox: Toolbox, settings: EngineSettings) -> Self {
        Self {
            client,
            toolbox,
            settings,
        }
    }

    fn build_request(&self, transcript: &Transcript, pending: &[Turn]) -> ChatRequest {
        let mut messages = transcript.api_history();
        messages.extend(pending.iter().map(ApiMessage::from_turn));

        ChatRequest {
            model: self.settings.model.clone(),
            system_instruction: if self.settings.system_prompt.is_empty() {
                None
            } else {
                Some(self.settings.system_prompt.clone())
            },
            messages,
            tools: builtin_tool_declarations(),
            stream: true,
        }
    }

    /// Run one user turn to completion.
    ///
    /// Returns `Ok(Some(turn))` with the committed assistant turn,
    /// `Ok(None)` when the turn was cancelled (transcript unchanged), or an
    /// error (transcript also unchanged). The sink receives the accumulated
    /// visible output on every increment and a final non-in-progress frame on
    /// every exit path.
    pub async fn send_turn(
        &self,
        cancel: &CancellationToken,
        transcript: &mut Transcript,
        parts: Vec<ContentPart>,
        sink: &mut dyn RenderSink,
    ) -> Result<Option<Turn>, StreamError> {
        let mut pending: Vec<Turn> = vec![Turn::user(parts)];
        let mut visible = String::new();
        let mut canonical = String::new();
        let mut depth: usize = 0;

        loop {
            let request = self.build_request(transcript, &pending);
            let mut rx = self.client.open_stream(request).await?;

            let mut resume = false;
            let mut finished = false;

            while let Some(event) = rx.recv().await {
                if cancel.is_cancelled() {
                    debug!("turn cancelled, discarding pending round-trip");
                    sink.render(&visible, false);
                    return Ok(None);
                }

                match event {
                    StreamEvent::Delta(delta) => {
                        if let Some(text) = delta.text {
                            visible.push_str(&text);
                            canonical.push_str(&text);
                            sink.render(&visible, true);
                        }

                        if !delta.tool_calls.is_empty() {
                            let calls = self.prepare_calls(delta.tool_calls);
                            self.append_call_summary(&mut visible, &calls);
                            sink.render(&visible, true);

                            pending.push(Turn::tool_requests(calls.clone()));
                            let mut results = Vec::with_capacity(calls.len());
                            for call in &calls {
                                if cancel.is_cancelled() {
                                    sink.render(&visible, false);
                                    return Ok(None);
                                }
                                results.push(self.toolbox.dispatch(call).await);
                            }
                            pending.push(Turn::tool_results(results));
                            resume = true;
                        }
                    }
                    StreamEvent::Error(message) => {
                        sink.render(&visible, false);
                        return Err(StreamError::Api(message));
                    }
                    StreamEvent::End => {
                        finished = true;
                        break;
                    }
                }
            }

            if !finished {
                sink.render(&visible, false);
                return Err(StreamError::Disconnected);
            }

            if resume {
                depth += 1;
                let limit = self.settings.tool_depth_limit;
                if limit > 0 && depth > limit {
                    sink.render(&visible, false);
                    return Err(StreamError::ToolDepthExceeded(limit));
                }
                continue;
            }

            let assistant = Turn::assistant_text(canonical);
            pending.push(assistant.clone());
            transcript.commit(pending);
            sink.render(&visible, false);
            return Ok(Some(assistant));
        }
    }

    fn prepare_calls(&self, calls: Vec<ToolCall>) -> Vec<ToolCall> {
        if !self.settings.dedupe_tool_calls {
            return calls;
        }

        let mut unique: Vec<ToolCall> = Vec::with_capacity(calls.len());
        for call in calls {
            if !unique.contains(&call) {
                unique.push(call);
            }
        }
        unique
    }

    /// Splice a `- Tool Name (args)` bullet into the visible output. The
    /// canonical response never sees this.
    fn append_call_summary(&self, visible: &mut String, calls: &[ToolCall]) {
        let summary = format_tool_call_names(calls);
        if summary.is_empty() {
            return;
        }
        let trimmed_len = visible.trim_end().len();
        visible.truncate(trimmed_len);
        visible.push_str("\n\n- ");
        visible.push_str(&summary);
        visible.push_str("\n\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{mpsc, Notify};

    use crate::api::ChunkDelta;
    use crate::core::message::Role;
    use crate::tools::ToolboxConfig;
    use crate::ui::render::RecordingSink;

    enum Script {
        Events(Vec<StreamEvent>),
        Gated {
            first: Vec<StreamEvent>,
            gate: Arc<Notify>,
            rest: Vec<StreamEvent>,
        },
    }

    #[derive(Default)]
    struct ScriptedClient {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn with_scripts(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn recorded_requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelClient for Arc<ScriptedClient> {
        async fn open_stream(
            &self,
            request: ChatRequest,
        ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, StreamError> {
            self.requests.lock().unwrap().push(request);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("more streams opened than scripted");

            let (tx, rx) = mpsc::unbounded_channel();
            match script {
                Script::Events(events) => {
                    for event in events {
                        let _ = tx.send(event);
                    }
                }
                Script::Gated { first, gate, rest } => {
                    tokio::spawn(async move {
                        for event in first {
                            let _ = tx.send(event);
                        }
                        gate.notified().await;
                        for event in rest {
                            let _ = tx.send(event);
                        }
                    });
                }
            }
            Ok(rx)
        }
    }

    fn text_delta(text: &str) -> StreamEvent {
        StreamEvent::Delta(ChunkDelta {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
        })
    }

    fn tool_delta(calls: Vec<ToolCall>) -> StreamEvent {
        StreamEvent::Delta(ChunkDelta {
            text: None,
            tool_calls: calls,
        })
    }

    fn calculate_call(equation: &str) -> ToolCall {
        ToolCall {
            name: "calculate".to_string(),
            args: [("equation".to_string(), json!(equation))]
                .into_iter()
                .collect(),
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            model: "test-model".to_string(),
            system_prompt: "be helpful".to_string(),
            tool_depth_limit: 16,
            dedupe_tool_calls: false,
        }
    }

    fn engine(
        client: Arc<ScriptedClient>,
        settings: EngineSettings,
    ) -> ChatEngine<Arc<ScriptedClient>> {
        ChatEngine::new(
            client,
            Toolbox::new(reqwest::Client::new(), ToolboxConfig::default()),
            settings,
        )
    }

    fn user_parts(text: &str) -> Vec<ContentPart> {
        vec![ContentPart::Text(text.to_string())]
    }

    #[test]
    fn compose_rejects_empty_input() {
        assert_eq!(
            compose_user_parts("   ", Vec::new()),
            Err(ValidationError::EmptyMessage)
        );

        let with_file = compose_user_parts(
            "",
            vec![ContentPart::Attachment {
                mime_type: "image/png".into(),
                data: "aGk=".into(),
            }],
        )
        .unwrap();
        assert_eq!(with_file.len(), 1);

        let with_text = compose_user_parts(" hi ", Vec::new()).unwrap();
        assert_eq!(with_text, vec![ContentPart::Text("hi".into())]);
    }

    #[tokio::test]
    async fn plain_turn_concatenates_deltas_and_commits() {
        let client = ScriptedClient::with_scripts(vec![Script::Events(vec![
            text_delta("Hello "),
            text_delta("world"),
            StreamEvent::End,
        ])]);
        let engine = engine(client.clone(), settings());
        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut sink = RecordingSink::new();

        let turn = engine
            .send_turn(&cancel, &mut transcript, user_parts("hi"), &mut sink)
            .await
            .unwrap()
            .expect("turn should complete");

        assert_eq!(turn.text(), "Hello world");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[0].role, Role::User);
        assert_eq!(transcript.turns()[1].role, Role::Assistant);
        assert_eq!(transcript.turns()[1].text(), "Hello world");

        // Frames grow monotonically and the final one is not in-progress.
        assert_eq!(
            sink.frames,
            vec![
                ("Hello ".to_string(), true),
                ("Hello world".to_string(), true),
                ("Hello world".to_string(), false),
            ]
        );

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].system_instruction.as_deref(), Some("be helpful"));
        assert_eq!(requests[0].tools.len(), 3);
        assert!(requests[0].stream);
    }

    #[tokio::test]
    async fn tool_round_trip_resumes_and_commits_in_order() {
        let client = ScriptedClient::with_scripts(vec![
            Script::Events(vec![
                tool_delta(vec![calculate_call("12 / (2.3 + 0.7)")]),
                StreamEvent::End,
            ]),
            Script::Events(vec![text_delta("The answer is 4."), StreamEvent::End]),
        ]);
        let engine = engine(client.clone(), settings());
        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut sink = RecordingSink::new();

        let turn = engine
            .send_turn(&cancel, &mut transcript, user_parts("compute"), &mut sink)
            .await
            .unwrap()
            .expect("turn should complete");

        // user, tool requests, tool results, assistant.
        let roles: Vec<Role> = transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Model, Role::User, Role::Assistant]);

        match &transcript.turns()[2].parts[0] {
            ContentPart::ToolCallResult(result) => {
                assert_eq!(result.tool_name, "calculate");
                assert_eq!(result.content(), Some("4"));
            }
            other => panic!("expected tool result part, got {:?}", other),
        }

        // The committed answer holds model text only.
        assert_eq!(turn.text(), "The answer is 4.");

        // The visible output got the bullet summary.
        let (final_frame, in_progress) = sink.last().unwrap();
        assert!(!in_progress);
        assert!(final_frame.contains("- Calculate (equation: 12 / (2.3 + 0.7))"));

        // The resumed request carries the whole pending round-trip.
        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 2);
        let roles: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "model", "user"]);
    }

    #[tokio::test]
    async fn duplicate_calls_collapse_when_dedupe_enabled() {
        let client = ScriptedClient::with_scripts(vec![
            Script::Events(vec![
                tool_delta(vec![calculate_call("1 + 1"), calculate_call("1 + 1")]),
                StreamEvent::End,
            ]),
            Script::Events(vec![text_delta("2"), StreamEvent::End]),
        ]);
        let mut opts = settings();
        opts.dedupe_tool_calls = true;
        let engine = engine(client, opts);
        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut sink = RecordingSink::new();

        engine
            .send_turn(&cancel, &mut transcript, user_parts("go"), &mut sink)
            .await
            .unwrap();

        assert_eq!(transcript.turns()[1].parts.len(), 1);
        assert_eq!(transcript.turns()[2].parts.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_calls_all_run_by_default() {
        let client = ScriptedClient::with_scripts(vec![
            Script::Events(vec![
                tool_delta(vec![calculate_call("1 + 1"), calculate_call("1 + 1")]),
                StreamEvent::End,
            ]),
            Script::Events(vec![text_delta("2"), StreamEvent::End]),
        ]);
        let engine = engine(client, settings());
        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut sink = RecordingSink::new();

        engine
            .send_turn(&cancel, &mut transcript, user_parts("go"), &mut sink)
            .await
            .unwrap();

        assert_eq!(transcript.turns()[1].parts.len(), 2);
        assert_eq!(transcript.turns()[2].parts.len(), 2);
    }

    #[tokio::test]
    async fn stream_error_leaves_transcript_unchanged() {
        let client = ScriptedClient::with_scripts(vec![Script::Events(vec![
            text_delta("partial"),
            StreamEvent::Error("API Error: overloaded".to_string()),
            StreamEvent::End,
        ])]);
        let engine = engine(client, settings());
        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut sink = RecordingSink::new();

        let err = engine
            .send_turn(&cancel, &mut transcript, user_parts("hi"), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Api(message) if message.contains("overloaded")));
        assert!(transcript.is_empty());
        assert_eq!(sink.last().unwrap(), &("partial".to_string(), false));
    }

    #[tokio::test]
    async fn channel_close_without_end_is_a_disconnect() {
        let client = ScriptedClient::with_scripts(vec![Script::Events(vec![text_delta("par")])]);
        let engine = engine(client, settings());
        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut sink = RecordingSink::new();

        let err = engine
            .send_turn(&cancel, &mut transcript, user_parts("hi"), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Disconnected));
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn depth_cap_stops_runaway_tool_loops() {
        let tool_stream = || {
            Script::Events(vec![
                tool_delta(vec![calculate_call("1 + 1")]),
                StreamEvent::End,
            ])
        };
        let client = ScriptedClient::with_scripts(vec![tool_stream(), tool_stream()]);
        let mut opts = settings();
        opts.tool_depth_limit = 1;
        let engine = engine(client, opts);
        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut sink = RecordingSink::new();

        let err = engine
            .send_turn(&cancel, &mut transcript, user_parts("loop"), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::ToolDepthExceeded(1)));
        assert!(transcript.is_empty());
    }

    /// Records frames and signals each render, so a test can cancel only
    /// after the engine has demonstrably applied an increment.
    struct SignallingSink {
        inner: RecordingSink,
        rendered: Arc<Notify>,
    }

    impl RenderSink for SignallingSink {
        fn render(&mut self, markdown: &str, in_progress: bool) {
            self.inner.render(markdown, in_progress);
            self.rendered.notify_one();
        }
    }

    #[tokio::test]
    async fn cancellation_keeps_the_applied_prefix_and_commits_nothing() {
        let rendered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let client = ScriptedClient::with_scripts(vec![Script::Gated {
            first: vec![text_delta("first part")],
            gate: gate.clone(),
            rest: vec![text_delta(" never shown"), StreamEvent::End],
        }]);
        let engine = engine(client, settings());
        let cancel = CancellationToken::new();
        let cancel_handle = cancel.clone();

        let sink_rendered = rendered.clone();
        let task = tokio::spawn(async move {
            let mut transcript = Transcript::new();
            let mut sink = SignallingSink {
                inner: RecordingSink::new(),
                rendered: sink_rendered,
            };
            let outcome = engine
                .send_turn(&cancel, &mut transcript, user_parts("hi"), &mut sink)
                .await;
            (outcome, transcript, sink.inner)
        });

        // Wait until the first delta is rendered, then cancel and release the
        // rest of the stream.
        rendered.notified().await;
        cancel_handle.cancel();
        gate.notify_one();

        let (outcome, transcript, sink) = task.await.unwrap();
        assert!(matches!(outcome, Ok(None)));
        assert!(transcript.is_empty());

        // Increments applied before the cancel survive in the final frame.
        assert_eq!(sink.last().unwrap(), &("first part".to_string(), false));
    }
}
