//! Configuration for augmentation runs.
//!
//! [`AugmentConfig`] carries everything the orchestrator needs: file
//! locations, batch sizing, model parameters and the retry policy.
//! [`RunLayout`] derives the conventional file locations from an input path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::sink::RejectionTarget;
use crate::llm::{ModelParams, ResponseFormat, RetryPolicy};

/// Default number of records dispatched concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Default number of successful generations after which a run stops.
pub const DEFAULT_TOTAL_GENERATIONS: u64 = 100_000;

/// Default interval between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_OUTPUT_DIR: &str = "data/output";
pub const DEFAULT_REJECTED_DIR: &str = "data/rejected";
pub const DEFAULT_PROCESSED_LOG: &str = "processed_indices.txt";
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// Suffix appended to the input file stem to name the output file.
pub const OUTPUT_SUFFIX: &str = "_augmented";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of its accepted range.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Conventional file locations for a run over one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub output_dir: PathBuf,
    pub rejected_dir: PathBuf,
    pub processed_log: PathBuf,
    pub templates_dir: PathBuf,
}

impl Default for RunLayout {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            rejected_dir: PathBuf::from(DEFAULT_REJECTED_DIR),
            processed_log: PathBuf::from(DEFAULT_PROCESSED_LOG),
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
        }
    }
}

impl RunLayout {
    /// Output file for `input`: `<output_dir>/<stem>_augmented.jsonl`.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        self.output_dir
            .join(format!("{}{}.jsonl", stem, OUTPUT_SUFFIX))
    }
}

/// Configuration for one augmentation run.
#[derive(Debug, Clone)]
pub struct AugmentConfig {
    /// Line-delimited JSON input; indexed in place before generation.
    pub input_path: PathBuf,
    /// Append-mode output file for augmented records.
    pub output_path: PathBuf,
    /// Where terminal failures are written.
    pub rejection: RejectionTarget,
    /// Append-only log of completed ids.
    pub processed_log: PathBuf,
    /// Directory of `*.txt` prompt templates.
    pub templates_dir: PathBuf,

    /// Successful generations after which the run stops.
    pub total_generations: u64,
    /// Records dispatched concurrently per batch.
    pub batch_size: usize,

    pub model: ModelParams,
    pub retry: RetryPolicy,
    pub response_format: ResponseFormat,

    /// How often to log progress; `None` disables the monitor.
    pub progress_interval: Option<Duration>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self::for_input("data/dataset.jsonl", &RunLayout::default())
    }
}

impl AugmentConfig {
    /// Configuration with default settings for `input`, placing every
    /// other file according to `layout`.
    pub fn for_input(input: impl Into<PathBuf>, layout: &RunLayout) -> Self {
        let input_path = input.into();
        Self {
            output_path: layout.output_path(&input_path),
            rejection: RejectionTarget::Directory(layout.rejected_dir.clone()),
            processed_log: layout.processed_log.clone(),
            templates_dir: layout.templates_dir.clone(),
            input_path,
            total_generations: DEFAULT_TOTAL_GENERATIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            model: ModelParams::default(),
            retry: RetryPolicy::default(),
            response_format: ResponseFormat::default(),
            progress_interval: Some(DEFAULT_PROGRESS_INTERVAL),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any setting is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.total_generations == 0 {
            return Err(ConfigError::ValidationFailed(
                "total_generations must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.model.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.model.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model name must not be empty".to_string(),
            ));
        }

        if let Some(interval) = self.progress_interval {
            if interval.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: "progress_interval".to_string(),
                    message: "must be greater than 0 seconds".to_string(),
                });
            }
        }

        Ok(())
    }
}
