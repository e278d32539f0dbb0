//! OpenRouter chat-completions backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use contextpack_shared::{AppConfig, ContextPackError, Result, resolve_api_key};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{LlmBackend, LlmPrompt};

/// OpenRouter client speaking the OpenAI chat-completions dialect.
#[derive(Clone)]
pub struct OpenRouterBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenRouterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenRouterBackend {
    /// Build a backend with an explicit key, model and base URL.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("contextpack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ContextPackError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Build a backend from config, resolving the API key from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        Self::new(
            api_key,
            config.openrouter.default_model.clone(),
            config.openrouter.base_url.clone(),
            Duration::from_secs(config.openrouter.timeout_secs),
        )
    }

    /// Override the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaSpec<'a>,
}

#[derive(Serialize)]
struct JsonSchemaSpec<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    code: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[async_trait]
impl LlmBackend for OpenRouterBackend {
    #[instrument(skip_all, fields(task = %prompt.name, model = %self.model))]
    async fn complete(
        &self,
        prompt: &LlmPrompt,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaSpec {
                    name: &prompt.name,
                    strict: true,
                    schema,
                },
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ContextPackError::Provider("model request timed out".into())
                } else {
                    ContextPackError::Provider(format!("model request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| ContextPackError::Provider(format!("failed to read model response: {e}")))?;

        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model responded"
        );

        if !status.is_success() {
            let message = serde_json::from_str::<ChatResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or_else(|| truncate(&body, 200));
            return Err(classify_status(status, message, retry_after));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ContextPackError::parse(format!("malformed completion envelope: {e}")))?;

        // OpenRouter can report upstream failures inside a 200 envelope.
        if let Some(err) = parsed.error {
            let code = err
                .code
                .as_ref()
                .and_then(|c| c.as_u64().or_else(|| c.as_str()?.parse().ok()))
                .and_then(|c| u16::try_from(c).ok())
                .and_then(|c| StatusCode::from_u16(c).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            warn!(code = code.as_u16(), message = %err.message, "provider error in completion body");
            return Err(classify_status(code, err.message, retry_after));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ContextPackError::parse("completion contained no message content"))?;

        parse_json_content(&content)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Map a provider status onto the error model.
fn classify_status(status: StatusCode, message: String, retry_after: Option<u64>) -> ContextPackError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ContextPackError::Credential(format!(
            "OpenRouter rejected the API key (HTTP {}): {message}",
            status.as_u16()
        )),
        StatusCode::TOO_MANY_REQUESTS => ContextPackError::RateLimited {
            message,
            retry_after_secs: retry_after,
        },
        _ => ContextPackError::Provider(format!("HTTP {}: {message}", status.as_u16())),
    }
}

fn retry_after_secs(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Parse model content as a JSON object, tolerating a Markdown code fence.
fn parse_json_content(content: &str) -> Result<serde_json::Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: serde_json::Value = serde_json::from_str(unfenced)
        .map_err(|e| ContextPackError::parse(format!("model returned invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(ContextPackError::parse("model returned JSON that is not an object"));
    }
    Ok(value)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
