pub mod attachments;
pub mod chat_stream;
pub mod config;
pub mod engine;
pub mod message;
pub mod session;
