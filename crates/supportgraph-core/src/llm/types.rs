//! Chat completion wire format
//!
//! Only the subset the extraction collaborator needs: a system and a user
//! message in, one JSON-object reply out.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct JsonObjectFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Request body for one model; the reply is always constrained to JSON
#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 2],
    temperature: f32,
    max_tokens: usize,
    response_format: JsonObjectFormat,
}

impl<'a> CompletionRequest<'a> {
    pub(crate) fn new(
        model: &'a str,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            model,
            messages: [
                ChatMessage {
                    role: Role::System,
                    content: system.to_string(),
                },
                ChatMessage {
                    role: Role::User,
                    content: user.to_string(),
                },
            ],
            temperature,
            max_tokens,
            response_format: JsonObjectFormat { kind: "json_object" },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Raw API reply
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CompletionResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

/// First choice of a reply
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
    /// Generation stopped at `max_tokens`; the JSON is probably cut short
    pub truncated: bool,
}

impl CompletionResponse {
    pub(crate) fn into_completion(self) -> Option<Completion> {
        let choice = self.choices.into_iter().next()?;
        Some(Completion {
            content: choice.message.content,
            model: self.model,
            tokens_used: self.usage.map(|u| u.total_tokens).unwrap_or(0),
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}
