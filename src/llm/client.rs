//! Core `CompletionClient` trait and the `GeminiClient` implementation.
//!
//! `GeminiClient` calls a `generateContent` endpoint with the prompt as the
//! sole content part of one turn.  One attempt per call: timeouts and 5xx
//! responses are reported upward verbatim, retry policy belongs to callers.
//! All connection details come from [`ApiConfig`].

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::{ApiConfig, ApiKey};

// ---------------------------------------------------------------------------
// CompletionError
// ---------------------------------------------------------------------------

/// Errors that can occur while obtaining a completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Network unreachable, connection reset or timeout.
    #[error("network error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("API Error {status}: {message}")]
    Api { status: u16, message: String },

    /// 400 / 403: the stored credential must be replaced.
    #[error("API Error {status}: {message}")]
    InvalidCredentials { status: u16, message: String },

    /// Success status but no candidate content.
    #[error("API 응답 형식이 올바르지 않습니다.")]
    EmptyResponse,
}

impl CompletionError {
    /// `true` when the caller must ask for a new credential rather than
    /// treating the failure as transient.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, CompletionError::InvalidCredentials { .. })
    }

    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::Api { status, .. }
            | CompletionError::InvalidCredentials { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Transport("request timed out".into())
        } else {
            // The URL carries the key as a query parameter.
            CompletionError::Transport(e.without_url().to_string())
        }
    }
}

/// Map a non-success response to [`CompletionError`].
///
/// The message comes from the provider's `error.message` when the body has
/// one, otherwise from the status reason phrase.
pub fn api_error(status: u16, reason: Option<&str>, body: &str) -> CompletionError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| reason.unwrap_or("Unknown Status").to_string());

    match status {
        400 | 403 => CompletionError::InvalidCredentials { status, message },
        _ => CompletionError::Api { status, message },
    }
}

/// Pull the generated text out of a success body.
///
/// Expected shape: `{ candidates: [ { content: { parts: [ { text } ] } } ] }`.
/// All text parts of the first candidate are concatenated.
pub fn extract_text(body: &Value) -> Result<String, CompletionError> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(CompletionError::EmptyResponse)?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();

    if text.trim().is_empty() {
        return Err(CompletionError::EmptyResponse);
    }
    Ok(text)
}

// ---------------------------------------------------------------------------
// CompletionClient trait
// ---------------------------------------------------------------------------

/// Async trait for text generation backends.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn CompletionClient>`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `prompt` and return the raw generated text (possibly fenced,
    /// possibly not JSON at all).
    async fn complete(&self, prompt: &str, key: &ApiKey) -> Result<String, CompletionError>;
}

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

/// Calls `{base_url}/v1beta/models/{model}:generateContent?key=…`.
pub struct GeminiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl GeminiClient {
    /// Build a client whose per-request timeout is `config.timeout_secs`.
    pub fn from_config(config: &ApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self::with_http_client(client, config)
    }

    /// Use a pre-built `reqwest::Client`.
    pub fn with_http_client(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Endpoint URL without the key parameter.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str, key: &ApiKey) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", key.expose())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = api_error(status.as_u16(), status.canonical_reason(), &text);
            log::warn!("completion: {err}");
            return Err(err);
        }

        let json: Value = match response.json().await {
            Ok(json) => json,
            Err(e) => {
                log::warn!("completion: success body is not JSON: {}", e.without_url());
                return Err(CompletionError::EmptyResponse);
            }
        };

        extract_text(&json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
