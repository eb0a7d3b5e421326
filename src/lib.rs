//! augment-forge: resumable batch augmentation of JSONL datasets.
//!
//! This library indexes line-delimited JSON datasets, renders rotating
//! prompt templates against each record, generates responses through an
//! OpenAI-compatible chat completion API in concurrent batches, and
//! curates the generated datasets offline.

// Core modules
pub mod augment;
pub mod cli;
pub mod curation;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod template;

// Re-export commonly used types
pub use augment::{AugmentConfig, Augmenter, RunSummary};
pub use dataset::Record;
pub use error::{
    CurationError, DatasetError, GenerationFailure, LlmError, ProgressLogError, SinkError,
    TemplateError,
};
