//! LLM access for concept extraction
//!
//! The extraction code only sees [`ChatModel`]. [`LlmClient`] is the
//! OpenRouter implementation; tests script their own.

mod client;
mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{LlmClient, OPENROUTER_BASE_URL};
pub use types::{CompletionOptions, LlmResponse, Message, Role};

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<LlmResponse>;

    /// Model identifier used for logging
    fn model_name(&self) -> &str;
}
