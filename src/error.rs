//! Error taxonomy for the conversation core.
//!
//! Three failure families with different propagation rules:
//! - [`ToolError`] stays inside the tool dispatcher, which converts it into a
//!   result envelope; it never aborts a round-trip.
//! - [`StreamError`] aborts the current round-trip and leaves the transcript
//!   uncommitted for that round-trip.
//! - [`ValidationError`] is raised before any model call is attempted.

use thiserror::Error;

/// Failure while driving a model stream. Always escapes to the caller of
/// `send_turn` and always leaves the transcript untouched.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The HTTP request could not be sent or the connection dropped.
    #[error("{0}")]
    Http(String),

    /// The API returned an error payload (already formatted for display).
    #[error("{0}")]
    Api(String),

    /// The stream channel closed without a terminal event.
    #[error("model stream ended unexpectedly")]
    Disconnected,

    /// The model kept requesting tools past the configured recursion cap.
    #[error("tool recursion limit of {0} exceeded")]
    ToolDepthExceeded(usize),
}

/// Failure inside a single tool execution. Callers outside the dispatcher
/// never see this type; the dispatcher folds it into the result envelope.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} requires the `{param}` argument")]
    MissingArgument {
        tool: &'static str,
        param: &'static str,
    },

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("unexpected HTTP status: {0}")]
    Status(reqwest::StatusCode),

    #[error("could not parse response: {0}")]
    Parse(String),

    #[error("{0}")]
    Eval(#[from] CalcError),
}

/// Malformed user input, rejected before any network traffic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("nothing to send: message is empty and no attachments are pending")]
    EmptyMessage,

    #[error("unsupported attachment: {0}")]
    UnsupportedAttachment(String),

    #[error("you can attach a maximum of {0} files")]
    AttachmentLimit(usize),
}

/// Failure from the equation evaluator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Eval(String),
}
