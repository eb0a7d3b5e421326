//! Dataset records and JSONL file handling.
//!
//! This module provides the [`Record`] type shared by the generation and
//! curation pipelines, line-delimited JSON helpers, and the one-shot
//! [`index_dataset`] step that gives every record a stable id.

pub mod indexer;
pub mod jsonl;
pub mod record;

pub use indexer::{first_record_has_idx, index_dataset, IndexOutcome};
pub use jsonl::{parse_record, read_records, write_records, JsonlReader, SourceLine};
pub use record::{Record, INDEX_FIELD};
