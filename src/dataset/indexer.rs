//! Stable record ids for a JSONL dataset.
//!
//! Every record gets an `idx` equal to its zero-based position among the
//! non-blank lines of the file at the time it is first indexed. A file
//! whose first record already carries `idx` is never touched again.
//!
//! The rewrite goes through a temporary file in the same directory that is
//! synced and then renamed over the original, so a crash mid-write leaves
//! either the old file or the fully indexed one, never a truncated mix.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use super::jsonl::{parse_record, read_records, write_records_to};
use crate::error::DatasetError;

/// What the indexer did to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// The first record already had an `idx`; the file was left untouched.
    AlreadyIndexed,
    /// Every record was rewritten with its position as `idx`.
    Indexed { records: usize },
    /// The file contains no records.
    Empty,
}

/// Whether the first non-blank record in `path` carries an `idx` field.
///
/// Returns `None` for a file with no records.
pub fn first_record_has_idx(path: &Path) -> Result<Option<bool>, DatasetError> {
    let reader = BufReader::new(fs::File::open(path)?);
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        return Ok(Some(parse_record(&line, i + 1)?.has_idx()));
    }
    Ok(None)
}

/// Ensure every record in `path` carries a stable `idx`.
///
/// Idempotent: on an already indexed file this reads one line and returns.
pub fn index_dataset(path: &Path) -> Result<IndexOutcome, DatasetError> {
    info!(path = %path.display(), "Checking if dataset needs indexing");

    match first_record_has_idx(path)? {
        None => {
            info!(path = %path.display(), "Dataset is empty, nothing to index");
            return Ok(IndexOutcome::Empty);
        }
        Some(true) => {
            info!(path = %path.display(), "Dataset is already indexed");
            return Ok(IndexOutcome::AlreadyIndexed);
        }
        Some(false) => {}
    }

    info!(path = %path.display(), "Indexing dataset");

    // Parse everything before writing anything: a malformed line aborts
    // with the original file intact.
    let mut records = read_records(path)?;
    for (position, record) in records.iter_mut().enumerate() {
        record.set_idx(position as u64);
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)?.permissions();

    let mut tmp = NamedTempFile::new_in(dir)?;
    write_records_to(tmp.as_file_mut(), &records)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path)
        .map_err(|e| DatasetError::Persist(e.error.to_string()))?;

    info!(path = %path.display(), records = records.len(), "Dataset indexed successfully");
    Ok(IndexOutcome::Indexed {
        records: records.len(),
    })
}
