//! Structured-output model backends.
//!
//! This crate provides:
//! - [`LlmBackend`]: the trait the extractor prompts through
//! - [`OpenRouterBackend`]: an OpenAI-compatible chat-completions client for OpenRouter
//!
//! Backends take a prompt plus a JSON schema and return the parsed JSON object.
//! Provider failures are mapped onto [`ContextPackError`] so the caller can tell
//! systemic failures (bad key, throttling) from one-off ones.
//!
//! [`ContextPackError`]: contextpack_shared::ContextPackError

pub mod openrouter;

use async_trait::async_trait;
use contextpack_shared::Result;

pub use openrouter::OpenRouterBackend;

/// One structured-output request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmPrompt {
    /// Schema name sent to the provider, e.g. `vision`.
    pub name: String,
    pub system: String,
    pub user: String,
}

impl LlmPrompt {
    pub fn new(name: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: system.into(),
            user: user.into(),
        }
    }
}

/// A model that answers a prompt with JSON matching a schema.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run the prompt and return the parsed JSON object.
    async fn complete(
        &self,
        prompt: &LlmPrompt,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Model identifier, for logs.
    fn model_id(&self) -> &str;
}
