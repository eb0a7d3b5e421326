//! OpenAI-compatible chat completion client.
//!
//! [`ChatCompletionsClient`] performs exactly one HTTP request per call and
//! maps the response onto [`LlmError`] variants by status code. Retrying is
//! the job of [`crate::llm::GenerationClient`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Environment variable holding the API base URL.
pub const API_BASE_ENV: &str = "OPENAI_API_BASE";

/// API base used when none is configured.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Environment variable holding the optional bearer token.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default request timeout. Long generations at high token limits can take minutes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for one chat completion call.
///
/// Optional sampling parameters are omitted from the JSON body when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier to use for generation.
    pub model: String,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Nucleus sampling parameter (0.0 - 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Minimum token probability relative to the most likely token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f64>,
    /// Tail free sampling parameter.
    #[serde(rename = "TFS", skip_serializing_if = "Option::is_none")]
    pub tfs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
}

impl GenerationRequest {
    /// Create a request with a single user message and no optional sampling parameters.
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        max_tokens: u32,
        temperature: f64,
    ) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            temperature,
            messages: vec![Message::user(prompt)],
            top_p: None,
            min_p: None,
            tfs: None,
            repetition_penalty: None,
            presence_penalty: None,
            frequency_penalty: None,
        }
    }

    /// The content of the first message, which is the rendered prompt.
    pub fn prompt(&self) -> Option<&str> {
        self.messages.first().map(|m| m.content.as_str())
    }
}

/// Response from a chat completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Generated choices/completions.
    pub choices: Vec<Choice>,
    /// Token usage statistics, when the backend reports them.
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl GenerationResponse {
    /// Build a response with a single assistant choice.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            id: None,
            model: None,
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Some("assistant".to_string()),
                    content: Some(content.into()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }

    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message inside a choice. Some backends send `null` content on refusals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for backends that answer one chat completion request.
///
/// Implementations make a single attempt and report failures as
/// [`LlmError`] so the caller can decide whether to retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
///
/// The underlying `reqwest::Client` pools connections, so one instance is
/// shared by every concurrent call in a batch.
pub struct ChatCompletionsClient {
    /// Base URL for the API, without the endpoint path.
    api_base: String,
    /// Optional API key sent as a bearer token.
    api_key: Option<String>,
    http_client: Client,
}

impl ChatCompletionsClient {
    /// Create a client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL (e.g., "http://localhost:5000/v1")
    /// * `api_key` - Optional bearer token
    /// * `timeout` - Per-request timeout
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            http_client,
        })
    }

    /// Create a client from environment variables.
    ///
    /// Reads `OPENAI_API_BASE` (required) and `OPENAI_API_KEY` (optional).
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiBase` if `OPENAI_API_BASE` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var(API_BASE_ENV).map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var(API_KEY_ENV).ok();
        Self::new(api_base, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Full URL of the completion endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Prefer the structured `error.message`, fall back to the raw body.
fn error_message(body: String) -> String {
    match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body,
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let mut http_request = self
            .http_client
            .post(self.completions_url())
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("Failed to read response body: {}", e)))?;

        match status {
            StatusCode::OK => {
                let response: GenerationResponse = serde_json::from_str(&body).map_err(|e| {
                    LlmError::ParseError(format!("Failed to parse API response: {}", e))
                })?;
                if response.first_content().is_none() {
                    return Err(LlmError::EmptyResponse);
                }
                Ok(response)
            }
            StatusCode::TOO_MANY_REQUESTS => Err(LlmError::RateLimited(error_message(body))),
            StatusCode::FORBIDDEN => Err(LlmError::Forbidden(body)),
            other => Err(LlmError::ApiError {
                code: other.as_u16(),
                message: error_message(body),
            }),
        }
    }
}
