//! Chat completion wire types (OpenAI-compatible, as served by OpenRouter)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling settings chosen per call
///
/// Article extraction and relation discovery use different temperatures and
/// token ceilings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionOptions {
    pub fn new(temperature: f32, max_tokens: usize) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

/// Request body; borrows the prompt so fallback attempts don't copy it
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: Reply,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Reply {
    #[serde(default)]
    pub content: Option<String>,
}

/// Completion text plus the model that actually answered
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    /// The provider stopped at the token ceiling
    pub truncated: bool,
}

impl LlmResponse {
    /// First non-empty choice, or `None` if the provider sent nothing usable
    pub(crate) fn from_wire(response: ChatResponse, requested_model: &str) -> Option<Self> {
        let model = response
            .model
            .unwrap_or_else(|| requested_model.to_string());
        let choice = response
            .choices
            .into_iter()
            .find(|c| c.message.content.as_deref().is_some_and(|t| !t.trim().is_empty()))?;

        Some(Self {
            content: choice.message.content.unwrap_or_default(),
            model,
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }

    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            truncated: false,
        }
    }
}
