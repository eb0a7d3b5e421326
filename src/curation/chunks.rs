//! Per-prompt work chunks.
//!
//! A manifest lists how many more records each system prompt needs. For
//! every entry the first `missing_count` records with that system prompt
//! are selected; entries that cannot be filled are reported and skipped.
//! The selected records are concatenated, their `response` is cleared so
//! they can be generated again, and the result is shuffled.

use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::dataset::Record;
use crate::error::CurationError;

/// Field matched against each manifest entry.
pub const SYSTEM_PROMPT_FIELD: &str = "system_prompt";

/// Field reset to an empty string in every selected record.
pub const RESPONSE_FIELD: &str = "response";

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub id: Value,
    pub index: Value,
    pub system_prompt: String,
    pub missing_count: usize,
}

impl ChunkSpec {
    /// `"<id> <index>"`, with string values unquoted.
    pub fn label(&self) -> String {
        format!("{} {}", display(&self.id), display(&self.index))
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(alias = "chuncks")]
    chunks: Vec<ChunkSpec>,
}

/// Parse a manifest `{"chunks": [...]}`; the key `chuncks` is accepted too.
pub fn parse_manifest(json: &str) -> Result<Vec<ChunkSpec>, CurationError> {
    let manifest: Manifest = serde_json::from_str(json)
        .map_err(|e| CurationError::InvalidManifest(e.to_string()))?;
    Ok(manifest.chunks)
}

pub fn load_manifest(path: &Path) -> Result<Vec<ChunkSpec>, CurationError> {
    parse_manifest(&std::fs::read_to_string(path)?)
}

/// An entry that could not be filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortChunk {
    pub label: String,
    pub missing: usize,
}

/// Result of chunk selection.
#[derive(Debug, Clone)]
pub struct ChunkSelection {
    pub records: Vec<Record>,
    pub filled: usize,
    pub short: Vec<ShortChunk>,
}

/// Select, concatenate, clear and shuffle chunks.
///
/// With a `seed` the shuffle is reproducible.
pub fn select_chunks(records: &[Record], specs: &[ChunkSpec], seed: Option<u64>) -> ChunkSelection {
    let mut selected = Vec::new();
    let mut short = Vec::new();
    let mut filled = 0;

    for spec in specs {
        let matching: Vec<&Record> = records
            .iter()
            .filter(|r| r.get_str(SYSTEM_PROMPT_FIELD) == Some(spec.system_prompt.as_str()))
            .collect();

        if matching.len() < spec.missing_count {
            let missing = spec.missing_count - matching.len();
            warn!("{}: Missing {} examples", spec.label(), missing);
            short.push(ShortChunk {
                label: spec.label(),
                missing,
            });
            continue;
        }

        selected.extend(
            matching
                .into_iter()
                .take(spec.missing_count)
                .cloned()
                .map(|mut record| {
                    record.insert(RESPONSE_FIELD, "");
                    record
                }),
        );
        filled += 1;
    }

    let mut rng = match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };
    selected.shuffle(&mut rng);

    info!(
        entries = specs.len(),
        filled,
        skipped = short.len(),
        records = selected.len(),
        "Selected chunks"
    );

    ChunkSelection {
        records: selected,
        filled,
        short,
    }
}
