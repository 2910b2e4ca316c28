//! OpenRouter chat client
//!
//! Walks the configured model chain (default model, then fallbacks). Each
//! model gets a few attempts when the provider answers 429; a model that is
//! missing or overloaded hands over to the next one. Anything else, such as a
//! bad key or an empty balance, stops the chain immediately.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client as HttpClient, StatusCode, header};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::ChatModel;
use super::types::{ChatRequest, ChatResponse, CompletionOptions, LlmResponse, Message};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Attempts per model while the provider keeps rate limiting
const ATTEMPTS_PER_MODEL: u32 = 3;

const BACKOFF_BASE_MS: u64 = 1000;

/// Used when a 429 carries no hint
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

#[derive(Clone)]
pub struct LlmClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
    models: Vec<String>,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

/// How a failed call should affect the model chain
#[derive(Debug)]
enum Failure {
    /// Wait and retry the same model
    Throttled(u64),
    /// Give up on this model, try the next
    ModelUnavailable(String),
    /// Stop the whole chain
    Fatal(Error),
}

impl LlmClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("LLM API key is empty".to_string()));
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let mut models = vec![config.default_model.clone()];
        for fallback in &config.fallback_models {
            if !models.contains(fallback) {
                models.push(fallback.clone());
            }
        }

        Ok(Self {
            http,
            api_key,
            base_url: OPENROUTER_BASE_URL.to_string(),
            models,
        })
    }

    /// Build a client from config, reading the key from the environment.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                Error::ConfigError(
                    "No API key. Set FOREIGNEYE_API_KEY or OPENROUTER_API_KEY.".to_string(),
                )
            })?;
        Self::new(config, api_key)
    }

    /// Point the client at another OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Default model first, then fallbacks, without repeats
    pub fn models(&self) -> &[String] {
        &self.models
    }

    async fn complete_on(
        &self,
        model: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> std::result::Result<LlmResponse, Failure> {
        let request = ChatRequest {
            model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://github.com/foreigneye/foreigneye")
            .header("X-Title", "ForeignEye")
            .json(&request)
            .send()
            .await
            .map_err(|e| Failure::Fatal(Error::NetworkError(e)))?;

        let status = response.status();
        if !status.is_success() {
            let header_hint = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body, header_hint));
        }

        let wire: ChatResponse = response.json().await.map_err(|e| {
            Failure::Fatal(Error::LLMError(format!("Unreadable completion: {}", e)))
        })?;

        LlmResponse::from_wire(wire, model)
            .ok_or_else(|| Failure::ModelUnavailable(format!("{} returned no content", model)))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<LlmResponse> {
        let mut last_error = None;

        for model in &self.models {
            for attempt in 1..=ATTEMPTS_PER_MODEL {
                debug!(model = %model, attempt, "Requesting completion");
                match self.complete_on(model, &messages, options).await {
                    Ok(response) => {
                        if response.truncated {
                            warn!(model = %response.model, "Completion hit the token ceiling");
                        }
                        info!(model = %response.model, "Completion received");
                        return Ok(response);
                    }
                    Err(Failure::Throttled(secs)) => {
                        last_error = Some(Error::RateLimited(secs));
                        if attempt == ATTEMPTS_PER_MODEL {
                            break;
                        }
                        let wait = backoff_ms(attempt, secs);
                        warn!(model = %model, attempt, wait_ms = wait, "Rate limited");
                        tokio::time::sleep(Duration::from_millis(wait)).await;
                    }
                    Err(Failure::ModelUnavailable(reason)) => {
                        warn!(model = %model, reason = %reason, "Falling back to next model");
                        last_error = Some(Error::LLMError(reason));
                        break;
                    }
                    Err(Failure::Fatal(e)) => return Err(e),
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::NoSuitableModel("no models configured".to_string())))
    }

    fn model_name(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or_default()
    }
}

fn classify(status: StatusCode, body: &str, header_hint: Option<u64>) -> Failure {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Failure::Throttled(
            header_hint
                .or_else(|| retry_after_from_body(body))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        ),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Failure::Fatal(Error::LLMError(
            "Rejected API key. Set FOREIGNEYE_API_KEY or OPENROUTER_API_KEY.".to_string(),
        )),
        StatusCode::PAYMENT_REQUIRED => Failure::Fatal(Error::LLMError(
            "OpenRouter account has insufficient credits".to_string(),
        )),
        StatusCode::NOT_FOUND => Failure::ModelUnavailable(format!("model not found: {}", body)),
        s if s.is_server_error() => Failure::ModelUnavailable(format!("provider error {}", s)),
        s if s == StatusCode::BAD_REQUEST && mentions_model(body) => {
            Failure::ModelUnavailable(format!("model rejected request: {}", body))
        }
        s => Failure::Fatal(Error::LLMError(format!("HTTP {}: {}", s, body))),
    }
}

fn mentions_model(body: &str) -> bool {
    let body = body.to_lowercase();
    ["no available provider", "not a valid model", "model is unavailable"]
        .iter()
        .any(|needle| body.contains(needle))
}

/// Exponential from the base, at least the provider's hint, plus up to 10% jitter
fn backoff_ms(attempt: u32, hint_secs: u64) -> u64 {
    let exponential = BACKOFF_BASE_MS.saturating_mul(1 << attempt.saturating_sub(1).min(10));
    let delay = exponential.max(hint_secs.saturating_mul(1000));
    let jitter = (delay / 10).max(1);
    delay + rand::thread_rng().gen_range(0..jitter)
}

fn retry_after_from_body(body: &str) -> Option<u64> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.pointer("/error/metadata/retry_after"))
        .or_else(|| json.pointer("/error/retry_after"))
        .and_then(serde_json::Value::as_u64)
}
