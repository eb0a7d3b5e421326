//! Error types for augment-forge operations.
//!
//! Defines error types for all major subsystems:
//! - LLM API interactions (single attempts and the retrying client)
//! - Template loading and prompt rendering
//! - Dataset indexing and record parsing
//! - The processed-ids log
//! - The output and rejection sinks
//! - The offline curation pipeline

use thiserror::Error;

/// Errors that can occur during a single LLM API attempt.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: OPENAI_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request refused (403): {0}")]
    Forbidden(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM response contained no choices")]
    EmptyResponse,
}

impl LlmError {
    /// Whether another attempt may succeed.
    ///
    /// Only a 403 refusal and a missing base URL are final; every other
    /// status, transport fault or parse fault is worth retrying.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LlmError::Forbidden(_) | LlmError::MissingApiBase)
    }
}

/// Terminal outcome of a generation that did not produce content.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("{reason}")]
    Rejected { reason: String },

    #[error("Max retries reached after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u64, last_error: String },
}

impl GenerationFailure {
    /// Reason string written to the rejection sink.
    pub fn reason(&self) -> String {
        match self {
            GenerationFailure::Rejected { reason } => reason.clone(),
            GenerationFailure::RetriesExhausted { .. } => "Max retries reached".to_string(),
        }
    }
}

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template directory '{0}' not found")]
    NotFound(String),

    #[error("No templates found in '{0}'")]
    Empty(String),

    #[error("Malformed template '{name}': {message}")]
    Malformed { name: String, message: String },

    #[error("Template placeholder '{field}' not found in record")]
    MissingField { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reading or indexing a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to parse record on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record on line {line} is not a JSON object")]
    NotAnObject { line: usize },

    #[error("Record on line {line} has no integer 'idx' field")]
    MissingIndex { line: usize },

    #[error("Record on line {line} repeats idx {idx} already read in this run")]
    DuplicateIndex { idx: u64, line: usize },

    #[error("Failed to replace dataset file: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading or appending to the processed-ids log.
#[derive(Debug, Error)]
pub enum ProgressLogError {
    #[error("Invalid entry on line {line} of processed log: '{content}'")]
    InvalidEntry { line: usize, content: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while writing to the output or rejection sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to serialize sink entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the offline curation pipeline.
#[derive(Debug, Error)]
pub enum CurationError {
    #[error("Invalid tag rule '{name}': {message}")]
    InvalidRule { name: String, message: String },

    #[error("Invalid chunk manifest: {0}")]
    InvalidManifest(String),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}
