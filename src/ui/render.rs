//! Rendering sink.
//!
//! The engine pushes the whole accumulated markdown on every increment; the
//! sink re-renders it for display, appending a transient in-progress
//! indicator that never reaches the transcript.

use pulldown_cmark::{html, Options, Parser};

/// Marker appended to the rendered output while a response is streaming.
pub const STREAM_INDICATOR: &str = r#"<span class="stream-indicator"></span>"#;

/// Incremental display target for accumulated markdown.
///
/// `Send` so the engine future holding the sink can run on a spawned task.
pub trait RenderSink: Send {
    fn render(&mut self, markdown: &str, in_progress: bool);
}

/// Converts markdown to HTML for display in a browser-style surface.
#[derive(Debug, Default)]
pub struct HtmlRenderSink {
    html: String,
}

impl HtmlRenderSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last rendered output.
    pub fn html(&self) -> &str {
        &self.html
    }
}

impl RenderSink for HtmlRenderSink {
    fn render(&mut self, markdown: &str, in_progress: bool) {
        let parser = Parser::new_ext(markdown, Options::all());
        let mut out = String::with_capacity(markdown.len() * 2);
        html::push_html(&mut out, parser);
        if in_progress {
            out.push_str(STREAM_INDICATOR);
        }
        self.html = out;
    }
}

/// Records every render call; used by engine tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub frames: Vec<(String, bool)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&(String, bool)> {
        self.frames.last()
    }
}

impl RenderSink for RecordingSink {
    fn render(&mut self, markdown: &str, in_progress: bool) {
        self.frames.push((markdown.to_string(), in_progress));
    }
}
