//! Language model abstraction
//!
//! Provides a unified chat-completion interface for:
//! - OpenAI and OpenAI-compatible servers (Ollama)
//! - Azure OpenAI deployments
//! - Google Gemini (`generateContent`)
//! - A scripted mock for tests and offline runs
//!
//! Transient failures (connect errors, timeouts, 429 and 5xx) are retried
//! with exponential backoff inside the configured time budget.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

/// Trait for chat-completion providers
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a conversation, returning the assistant's text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

type Attempt<T> = std::result::Result<T, backoff::Error<AppError>>;

fn transport_error(e: reqwest::Error) -> backoff::Error<AppError> {
    let retryable = e.is_connect() || e.is_timeout();
    let err = AppError::LlmError {
        message: format!("Request failed: {}", e),
    };
    if retryable {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

async fn check_status(response: reqwest::Response) -> Attempt<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let err = AppError::LlmError {
        message: format!("API error {}: {}", status, body),
    };
    if status.as_u16() == 429 || status.is_server_error() {
        tracing::warn!(status = %status, "LLM request failed, retrying");
        Err(backoff::Error::transient(err))
    } else {
        Err(backoff::Error::permanent(err))
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn retry_policy(budget_secs: u64) -> backoff::ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(Duration::from_secs(budget_secs)))
        .build()
}

// ============================================================================
// OpenAI-compatible chat completions (OpenAI, Azure, Ollama)
// ============================================================================

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    ApiKeyHeader(String),
    None,
}

/// Client for `/chat/completions` style APIs
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry_budget_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatCompletionsClient {
    /// OpenAI (or any server speaking its protocol with a bearer key)
    pub fn openai(config: &LlmConfig) -> Result<Self> {
        let api_key = require_key(config, "openai")?;
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self::with_auth(config, format!("{}/chat/completions", base.trim_end_matches('/')), Auth::Bearer(api_key))
    }

    /// Local Ollama through its OpenAI-compatible endpoint
    pub fn ollama(config: &LlmConfig) -> Result<Self> {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/v1".to_string());
        Self::with_auth(config, format!("{}/chat/completions", base.trim_end_matches('/')), Auth::None)
    }

    /// Azure OpenAI; `model` is the deployment name
    pub fn azure(config: &LlmConfig) -> Result<Self> {
        let api_key = require_key(config, "azure")?;
        let base = config.base_url.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.base_url is required for the azure provider".to_string(),
        })?;
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            base.trim_end_matches('/'),
            config.model,
            config.api_version
        );
        Self::with_auth(config, url, Auth::ApiKeyHeader(api_key))
    }

    fn with_auth(config: &LlmConfig, url: String, auth: Auth) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url,
            auth,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_budget_secs: config.retry_budget_secs,
        })
    }

    async fn attempt(&self, messages: &[ChatMessage]) -> Attempt<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let builder = self.client.post(&self.url).json(&request);
        let builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key),
            Auth::ApiKeyHeader(key) => builder.header("api-key", key),
            Auth::None => builder,
        };

        let response = builder.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;

        let chat: ChatResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::LlmError {
                message: format!("Failed to parse LLM response: {}", e),
            })
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                backoff::Error::permanent(AppError::LlmError {
                    message: "Empty response from LLM".to_string(),
                })
            })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        backoff::future::retry(retry_policy(self.retry_budget_secs), || self.attempt(messages)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Google Gemini
// ============================================================================

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry_budget_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key: require_key(config, "gemini")?,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_budget_secs: config.retry_budget_secs,
        })
    }

    fn build_request(&self, messages: &[ChatMessage]) -> GeminiRequest {
        let system: Vec<GeminiPart> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| GeminiPart { text: m.content.clone() })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: Some(if m.role == Role::Assistant { "model" } else { "user" }.to_string()),
                parts: vec![GeminiPart { text: m.content.clone() }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| GeminiContent { role: None, parts: system }),
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        }
    }

    async fn attempt(&self, request: &GeminiRequest) -> Attempt<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::LlmError {
                message: format!("Failed to parse Gemini response: {}", e),
            })
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(backoff::Error::permanent(AppError::LlmError {
                message: "Empty response from Gemini".to_string(),
            }));
        }
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = self.build_request(messages);
        backoff::future::retry(retry_policy(self.retry_budget_secs), || self.attempt(&request)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Scripted language model for tests and offline runs.
///
/// Queued replies are returned in order; once the queue is empty every call
/// gets the fallback reply. Every conversation received is recorded.
pub struct MockLanguageModel {
    replies: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLanguageModel {
    /// Mock that answers every call with a fixed sentence
    pub fn new() -> Self {
        Self::with_fallback("This section is relevant to the request.")
    }

    /// Mock that answers every call with `reply`
    pub fn with_fallback(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Mock whose every call fails
    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply
    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(reply.into()));
        self
    }

    /// Queue a failure
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(AppError::LlmError { message: message.into() }));
        self
    }

    /// Conversations received so far
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        let queued = self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match queued {
            Some(reply) => reply,
            None => self.fallback.clone().ok_or_else(|| AppError::LlmError {
                message: "mock language model is configured to fail".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

fn require_key(config: &LlmConfig, provider: &str) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::Configuration {
            message: format!("llm.api_key is required for the {} provider", provider),
        })
}

/// Create a language model based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let model: Arc<dyn LanguageModel> = match config.provider.as_str() {
        "openai" => Arc::new(ChatCompletionsClient::openai(config)?),
        "azure" => Arc::new(ChatCompletionsClient::azure(config)?),
        "ollama" => Arc::new(ChatCompletionsClient::ollama(config)?),
        "gemini" => Arc::new(GeminiClient::new(config)?),
        "mock" => Arc::new(MockLanguageModel::new()),
        other => {
            return Err(AppError::Configuration {
                message: format!(
                    "Unknown llm provider '{}'; expected openai, azure, gemini, ollama or mock",
                    other
                ),
            })
        }
    };

    tracing::info!(provider = %config.provider, model = %model.model_name(), "Language model configured");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_queue_then_fallback() {
        let llm = MockLanguageModel::with_fallback("done");
        llm.push_reply("first").push_error("boom");

        let messages = vec![ChatMessage::user("hi")];
        assert_eq!(llm.complete(&messages).await.unwrap(), "first");
        assert!(matches!(
            llm.complete(&messages).await,
            Err(AppError::LlmError { .. })
        ));
        assert_eq!(llm.complete(&messages).await.unwrap(), "done");
        assert_eq!(llm.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let llm = MockLanguageModel::failing();
        assert!(llm.complete(&[ChatMessage::user("x")]).await.is_err());
    }

    #[test]
    fn test_factory_requires_keys() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_language_model(&config),
            Err(AppError::Configuration { .. })
        ));

        let config = LlmConfig {
            provider: "azure".to_string(),
            api_key: Some("k".to_string()),
            base_url: None,
            ..LlmConfig::default()
        };
        assert!(create_language_model(&config).is_err());

        let config = LlmConfig {
            provider: "unknown".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_language_model(&config).is_err());
    }

    #[test]
    fn test_gemini_request_shape() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: Some("key".to_string()),
            ..LlmConfig::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        let request = client.build_request(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
        ]);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert!(json["generationConfig"]["maxOutputTokens"].is_number());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_value(ChatMessage::system("x")).unwrap();
        assert_eq!(json["role"], "system");
    }
}
