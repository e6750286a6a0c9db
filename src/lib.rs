//! Palaver is a chat client core for working with remote streaming LLM APIs,
//! augmented with a small set of callable tools.
//!
//! The crate is organized around a few collaborating layers:
//! - [`core`] owns the transcript, per-conversation session state,
//!   configuration, and the streaming conversation engine that interleaves
//!   model text deltas with tool execution.
//! - [`tools`] implements the three built-in tools (web search, webpage text
//!   extraction, equation evaluation) behind a total dispatch boundary.
//! - [`api`] defines the wire payloads exchanged with the model API.
//! - [`ui`] holds the rendering sink contract, the markdown-to-HTML sink,
//!   and the transient error-notice surface.
//!
//! The binary entrypoint (`src/main.rs`) wires a terminal driver around the
//! engine; library consumers embed [`core::engine::ChatEngine`] directly.

pub mod api;
pub mod core;
pub mod error;
pub mod tools;
pub mod ui;
pub mod utils;
