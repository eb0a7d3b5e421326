//! Resumable batch augmentation of JSONL datasets.
//!
//! The [`Augmenter`] indexes the input once, then reads it in batches,
//! renders one rotated template per record, generates all prompts of a
//! batch concurrently, and appends results to the output sink. Completed
//! ids are tracked in a [`ProcessedSet`] so an interrupted run resumes
//! where it stopped.
//!
//! ```ignore
//! use augment_forge::augment::{AugmentConfig, Augmenter, RunLayout};
//! use augment_forge::llm::ChatCompletionsClient;
//! use std::sync::Arc;
//!
//! let config = AugmentConfig::for_input("data/questions.jsonl", &RunLayout::default());
//! let provider = Arc::new(ChatCompletionsClient::from_env()?);
//! let summary = Augmenter::new(config, provider).run().await?;
//! println!("{} generations written", summary.succeeded);
//! ```

pub mod config;
pub mod orchestrator;
pub mod processed;
pub mod progress;
pub mod sink;

pub use config::{
    AugmentConfig, ConfigError, RunLayout, DEFAULT_BATCH_SIZE, DEFAULT_OUTPUT_DIR,
    DEFAULT_PROCESSED_LOG, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REJECTED_DIR,
    DEFAULT_TEMPLATES_DIR, DEFAULT_TOTAL_GENERATIONS,
};
pub use orchestrator::{
    AugmentEvent, Augmenter, RunSummary, AUGMENTATION_FIELD, PROMPT_FIELD, RESPONSE_FIELD,
    TEMPLATE_FIELD,
};
pub use processed::ProcessedSet;
pub use progress::{ProgressCounters, ProgressMonitor, ProgressSnapshot};
pub use sink::{OutputSink, RejectionEntry, RejectionSink, RejectionTarget};
