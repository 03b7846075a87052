//! LLM integration for the extraction collaborator
//!
//! OpenAI-compatible chat completions (OpenRouter by default) with model
//! fallback and JSON-object output.

mod client;
mod types;

pub use client::LlmClient;
pub use types::{ChatMessage, Completion, Role};
