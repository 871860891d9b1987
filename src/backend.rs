//! Backend adapter abstraction and implementations
//!
//! Provides the [`BackendAdapter`] trait and production-ready adapters:
//! - [`EchoBackend`]: testing/demo adapter
//! - [`OpenAiBackend`]: OpenAI chat completions API
//! - [`HuggingFaceBackend`]: Hugging Face inference API
//!
//! Adapters return a structured [`ProviderError`] whose [`FailureKind`]
//! tells the dispatcher whether the failure is permanent (credential/auth)
//! or transient. Classification happens here, from HTTP status codes and
//! transport errors — never from error-message text.
//!
//! ## Environment Variables
//!
//! - `OPENAI_API_KEY`: credential for [`OpenAiBackend::from_env`]
//! - `HUGGINGFACE_API_KEY`: credential for [`HuggingFaceBackend::from_env`]

use crate::DispatchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How a backend failure should be treated by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credential invalid/missing, or the backend cannot serve the request
    /// at all. The provider is disabled for a cooldown period.
    Auth,
    /// Timeout, network error, malformed response, or a remote rate-limit
    /// signal. The provider stays selectable for subsequent calls.
    Transient,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// Structured backend failure: a classification plus a human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct ProviderError {
    /// Auth or transient, decided by the adapter that produced the error.
    pub kind: FailureKind,
    /// Diagnostic detail (status code, transport error, etc.).
    pub message: String,
}

impl ProviderError {
    /// An auth-classified failure.
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Auth,
            message: message.into(),
        }
    }

    /// A transient-classified failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// `true` if this failure should disable the provider.
    pub fn is_auth(&self) -> bool {
        self.kind == FailureKind::Auth
    }
}

/// Map a non-success HTTP status to a failure kind.
///
/// 401/403 mean the credential was rejected; 404 means the backend cannot
/// serve this model at all. Everything else — 429 rate-limit signals, 5xx,
/// and the rest — is transient.
fn classify_status(status: reqwest::StatusCode) -> FailureKind {
    match status.as_u16() {
        401 | 403 | 404 => FailureKind::Auth,
        _ => FailureKind::Transient,
    }
}

/// Build a `ProviderError` from a failed HTTP response.
fn status_error(backend: &str, status: reqwest::StatusCode, body: &str) -> ProviderError {
    ProviderError {
        kind: classify_status(status),
        message: format!("{backend} API error {status}: {body}"),
    }
}

impl From<reqwest::Error> for ProviderError {
    /// Transport-level failures (timeouts, connection errors, body decode
    /// errors) are always transient.
    fn from(e: reqwest::Error) -> Self {
        ProviderError::transient(format!("request failed: {e}"))
    }
}

/// Capability interface for one provider kind.
///
/// Implementations must be thread-safe (`Send + Sync`); the dispatcher holds
/// them as `Arc<dyn BackendAdapter>` keyed by provider name, so adding a
/// provider never grows a conditional branch in dispatch logic.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Perform one completion call.
    ///
    /// `model` and `max_output_tokens` come from the registry entry for the
    /// selected provider; the adapter itself carries only transport state
    /// (HTTP client, credential, base URL).
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] carrying the failure classification.
    async fn invoke(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        model: &str,
        max_output_tokens: u32,
    ) -> Result<String, ProviderError>;
}

// ============================================================================
// Echo Backend (Testing)
// ============================================================================

/// Dummy echo adapter for testing and demos.
///
/// Returns the prompt unchanged after a simulated delay, with no network
/// dependency.
pub struct EchoBackend {
    /// Simulated inference delay.
    pub delay_ms: u64,
}

impl EchoBackend {
    /// Echo adapter with a 10 ms simulated delay.
    pub fn new() -> Self {
        Self { delay_ms: 10 }
    }

    /// Echo adapter with a custom delay.
    pub fn with_delay(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendAdapter for EchoBackend {
    async fn invoke(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _model: &str,
        _max_output_tokens: u32,
    ) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(prompt.to_string())
    }
}

// ============================================================================
// OpenAI Backend
// ============================================================================

/// OpenAI chat completions request payload.
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

/// OpenAI chat completions response.
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// OpenAI chat completions adapter.
///
/// ## Example
///
/// ```no_run
/// use tokio_provider_dispatch::OpenAiBackend;
/// use std::time::Duration;
///
/// let backend = OpenAiBackend::new("sk-...")
///     .with_timeout(Duration::from_secs(30));
/// ```
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiBackend {
    /// Create an adapter with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create an adapter from the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if the variable is not set, so
    /// misconfiguration surfaces at startup rather than at the first call.
    pub fn from_env() -> Result<Self, DispatchError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| DispatchError::Config("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Override the API base URL (proxies, compatible servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl BackendAdapter for OpenAiBackend {
    async fn invoke(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        model: &str,
        max_output_tokens: u32,
    ) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(OpenAiMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(OpenAiMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let request = OpenAiRequest {
            model: model.to_string(),
            messages,
            max_tokens: max_output_tokens,
            temperature: 0.1,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI", status, &body));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("malformed OpenAI response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(content)
    }
}

// ============================================================================
// Hugging Face Backend
// ============================================================================

/// Hugging Face text-generation request payload.
#[derive(Debug, Serialize)]
struct HfRequest {
    inputs: String,
    parameters: HfParameters,
}

#[derive(Debug, Serialize)]
struct HfParameters {
    max_new_tokens: u32,
    temperature: f32,
    do_sample: bool,
    return_full_text: bool,
    stop: Vec<String>,
}

/// Hugging Face text-generation response item.
#[derive(Debug, Deserialize)]
struct HfGeneration {
    generated_text: Option<String>,
}

/// Hugging Face inference API adapter.
///
/// The API has no separate system-prompt field, so the system prompt is
/// folded into the prompt text as a `User:`/`Assistant:` transcript.
pub struct HuggingFaceBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl HuggingFaceBackend {
    /// Create an adapter with an explicit API token.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api-inference.huggingface.co".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create an adapter from the `HUGGINGFACE_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if the variable is not set.
    pub fn from_env() -> Result<Self, DispatchError> {
        let api_key = std::env::var("HUGGINGFACE_API_KEY")
            .map_err(|_| DispatchError::Config("HUGGINGFACE_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn full_prompt(prompt: &str, system_prompt: Option<&str>) -> String {
        match system_prompt {
            Some(system) => format!("{system}\n\nUser: {prompt}\nAssistant:"),
            None => prompt.to_string(),
        }
    }
}

#[async_trait]
impl BackendAdapter for HuggingFaceBackend {
    async fn invoke(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        model: &str,
        max_output_tokens: u32,
    ) -> Result<String, ProviderError> {
        let request = HfRequest {
            inputs: Self::full_prompt(prompt, system_prompt),
            parameters: HfParameters {
                max_new_tokens: max_output_tokens,
                temperature: 0.1,
                do_sample: true,
                return_full_text: false,
                stop: vec!["User:".to_string(), "\n\n".to_string()],
            },
        };

        let response = self
            .client
            .post(format!("{}/models/{model}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Hugging Face", status, &body));
        }

        let generations: Vec<HfGeneration> = response.json().await.map_err(|e| {
            ProviderError::transient(format!("malformed Hugging Face response: {e}"))
        })?;

        let content = generations
            .into_iter()
            .next()
            .and_then(|g| g.generated_text)
            .ok_or_else(|| ProviderError::transient("empty Hugging Face response"))?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_backend_returns_prompt() {
        let backend = EchoBackend::with_delay(1);
        let result = backend
            .invoke("hello world", None, "echo-model", 64)
            .await
            .unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_classify_status_auth_codes() {
        for code in [401u16, 403, 404] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert_eq!(classify_status(status), FailureKind::Auth, "code {code}");
        }
    }

    #[test]
    fn test_classify_status_transient_codes() {
        for code in [400u16, 408, 429, 500, 502, 503] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert_eq!(
                classify_status(status),
                FailureKind::Transient,
                "code {code}"
            );
        }
    }

    #[test]
    fn test_provider_error_display_includes_kind_and_message() {
        let err = ProviderError::auth("key rejected");
        assert_eq!(err.to_string(), "auth failure: key rejected");
        let err = ProviderError::transient("timed out");
        assert_eq!(err.to_string(), "transient failure: timed out");
    }

    #[test]
    fn test_is_auth_predicate() {
        assert!(ProviderError::auth("x").is_auth());
        assert!(!ProviderError::transient("x").is_auth());
    }

    #[test]
    fn test_hf_full_prompt_folds_system_prompt() {
        let full = HuggingFaceBackend::full_prompt("fix this", Some("be terse"));
        assert_eq!(full, "be terse\n\nUser: fix this\nAssistant:");
        assert_eq!(HuggingFaceBackend::full_prompt("fix this", None), "fix this");
    }

    #[test]
    fn test_openai_request_serializes_expected_shape() {
        let request = OpenAiRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: "sys".to_string(),
                },
                OpenAiMessage {
                    role: "user",
                    content: "hi".to_string(),
                },
            ],
            max_tokens: 4000,
            temperature: 0.1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 4000);
    }

    #[test]
    fn test_openai_response_parses_missing_content_as_none() {
        let raw = r#"{"choices":[{"message":{"role":"assistant"}}]}"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn test_hf_response_parses_generated_text() {
        let raw = r#"[{"generated_text":"answer"}]"#;
        let parsed: Vec<HfGeneration> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].generated_text.as_deref(), Some("answer"));
    }
}
