//! Retrying generation client.
//!
//! Wraps a single-attempt [`LlmProvider`] with the status-code policy used
//! by the augmentation pipeline:
//!
//! - 200 with usable content: success
//! - 403: terminal rejection, never retried
//! - 429, any other status, transport and parse faults: wait the retry
//!   delay and try again, until the [`RetryPolicy`] runs out
//!
//! The client never returns anything but content or a [`GenerationFailure`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::chat::{GenerationRequest, LlmProvider};
use super::retry::RetryPolicy;
use crate::error::{GenerationFailure, LlmError};

/// Model name and sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub min_p: Option<f64>,
    pub tfs: Option<f64>,
    pub repetition_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "mix".to_string(),
            max_tokens: 16000,
            temperature: 1.3,
            top_p: None,
            min_p: None,
            tfs: None,
            repetition_penalty: None,
            presence_penalty: None,
            frequency_penalty: None,
        }
    }
}

impl ModelParams {
    /// Build the request body for one prompt.
    pub fn request(&self, prompt: &str) -> GenerationRequest {
        let mut request =
            GenerationRequest::new(&self.model, prompt, self.max_tokens, self.temperature);
        request.top_p = self.top_p;
        request.min_p = self.min_p;
        request.tfs = self.tfs;
        request.repetition_penalty = self.repetition_penalty;
        request.presence_penalty = self.presence_penalty;
        request.frequency_penalty = self.frequency_penalty;
        request
    }
}

/// What a successful response's content must look like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Any text is accepted.
    #[default]
    Text,
    /// Content must parse as JSON; unparseable content is retried.
    Json,
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseFormat::Text => write!(f, "text"),
            ResponseFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ResponseFormat::Text),
            "json" => Ok(ResponseFormat::Json),
            other => Err(format!("unknown response format '{}': expected text or json", other)),
        }
    }
}

/// Content produced for one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Text of the first choice.
    pub content: String,
    /// Parsed content, in [`ResponseFormat::Json`] mode.
    pub parsed: Option<Value>,
    /// Number of attempts it took, including the successful one.
    pub attempts: u64,
}

/// Generation client with retry and rejection semantics.
///
/// Cheap to share by reference across the concurrent calls of a batch.
pub struct GenerationClient {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    format: ResponseFormat,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            format: ResponseFormat::Text,
        }
    }

    /// Require responses in the given format.
    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Generate content for `prompt`.
    ///
    /// `label` identifies the record in log lines.
    pub async fn generate(
        &self,
        label: &str,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<Completion, GenerationFailure> {
        let request = params.request(prompt);
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            debug!(record = label, attempt = attempts, "Sending prompt");

            let err = match self.attempt(&request).await {
                Ok((content, parsed)) => {
                    debug!(record = label, attempts, "Received successful response");
                    return Ok(Completion {
                        content,
                        parsed,
                        attempts,
                    });
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                warn!(record = label, error = %err, "Request rejected, not retrying");
                let reason = match err {
                    LlmError::Forbidden(body) => body,
                    other => other.to_string(),
                };
                return Err(GenerationFailure::Rejected { reason });
            }

            if !self.retry.should_retry(attempts) {
                warn!(
                    record = label,
                    attempts,
                    error = %err,
                    "Max retries reached"
                );
                return Err(GenerationFailure::RetriesExhausted {
                    attempts,
                    last_error: err.to_string(),
                });
            }

            warn!(
                record = label,
                attempt = attempts,
                max_attempts = %self.retry.limit,
                delay_secs = self.retry.delay.as_secs_f64(),
                error = %err,
                "Transient error, will retry"
            );
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    /// One request, including content validation.
    async fn attempt(
        &self,
        request: &GenerationRequest,
    ) -> Result<(String, Option<Value>), LlmError> {
        let response = self.provider.generate(request).await?;
        let content = response
            .first_content()
            .ok_or(LlmError::EmptyResponse)?
            .to_string();

        let parsed = match self.format {
            ResponseFormat::Text => None,
            ResponseFormat::Json => Some(parse_json_content(&content)?),
        };
        Ok((content, parsed))
    }
}

/// Parse content as JSON, falling back to a copy with backslash escapes
/// decoded when the model escaped the whole object (`{\"a\": 1}`).
fn parse_json_content(content: &str) -> Result<Value, LlmError> {
    let err = match serde_json::from_str(content) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    if let Some(value) = unescape_backslashes(content)
        .and_then(|unescaped| serde_json::from_str(&unescaped).ok())
    {
        debug!("Parsed response content after decoding backslash escapes");
        return Ok(value);
    }
    Err(LlmError::ParseError(format!(
        "Response content is not valid JSON: {}",
        err
    )))
}

/// Decode `\n`, `\t`, `\r`, `\b`, `\f`, `\"`, `\'`, `\/`, `\\`,
/// `\xHH` and `\uXXXX` (including surrogate pairs). Unknown escapes are
/// kept as written. Returns `None` when there is nothing to decode or a
/// numeric escape is invalid.
fn unescape_backslashes(content: &str) -> Option<String> {
    if !content.contains('\\') {
        return None;
    }

    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some(q @ ('"' | '\'' | '/' | '\\')) => out.push(q),
            Some('x') => out.push(char::from_u32(hex_digits(&mut chars, 2)?)?),
            Some('u') => {
                let high = hex_digits(&mut chars, 4)?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        return None;
                    }
                    let low = hex_digits(&mut chars, 4)?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return None;
                    }
                    0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                } else {
                    high
                };
                out.push(char::from_u32(code)?);
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

fn hex_digits(chars: &mut std::str::Chars<'_>, count: usize) -> Option<u32> {
    let mut value = 0;
    for _ in 0..count {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}
