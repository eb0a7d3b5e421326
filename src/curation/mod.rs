//! Offline curation of generated datasets.
//!
//! Two passes over line-delimited JSON files:
//!
//! 1. **Filter** ([`run_filter`]): exact-match deduplication on a list of
//!    keys, exclusion of records already present in a reference file, and
//!    removal of records matched by any [`TagRule`].
//! 2. **Chunk** ([`run_chunk`]): selection of per-system-prompt work chunks
//!    from a manifest, producing the next input for augmentation.

pub mod chunks;
pub mod dedup;
pub mod tags;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::dataset::{read_records, write_records};
use crate::error::CurationError;

pub use chunks::{
    load_manifest, parse_manifest, select_chunks, ChunkSelection, ChunkSpec, ShortChunk,
};
pub use dedup::{
    collect_field_values, deduplicate, exclude, value_key, DedupStep, DeduplicationResult,
    DEFAULT_DEDUP_KEYS, DEFAULT_EXCLUDE_FIELD,
};
pub use tags::{
    filter_tagged, load_rules, parse_rules, RegexTagRule, TagFilterResult, TagRule, TagRuleSpec,
    DEFAULT_TAG_FIELDS,
};

/// Options for the filter pass.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Deduplication keys, applied in order.
    pub keys: Vec<String>,
    /// Reference file whose `exclude_field` values are dropped from the input.
    pub exclude_from: Option<PathBuf>,
    pub exclude_field: String,
    /// YAML tag rules file.
    pub tags: Option<PathBuf>,
}

impl FilterOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            keys: DEFAULT_DEDUP_KEYS.iter().map(|k| k.to_string()).collect(),
            exclude_from: None,
            exclude_field: DEFAULT_EXCLUDE_FIELD.to_string(),
            tags: None,
        }
    }
}

/// Counts from a filter pass.
#[derive(Debug, Clone, Serialize)]
pub struct FilterReport {
    pub total_before: usize,
    pub dedup_steps: Vec<DedupStep>,
    pub excluded: usize,
    pub dropped_by_tag: BTreeMap<String, usize>,
    pub total_after: usize,
    pub output: PathBuf,
}

/// Deduplicate, exclude and tag-filter `options.input` into `options.output`.
pub fn run_filter(options: &FilterOptions) -> Result<FilterReport, CurationError> {
    let records = read_records(&options.input)?;
    let dedup = deduplicate(records, options.keys.as_slice());
    let total_before = dedup.total_before;
    let mut records = dedup.kept;

    let excluded = match &options.exclude_from {
        Some(reference) => {
            let excluded = collect_field_values(&read_records(reference)?, &options.exclude_field);
            exclude(&mut records, &options.exclude_field, &excluded)
        }
        None => 0,
    };

    let (records, dropped_by_tag) = match &options.tags {
        Some(path) => {
            let rules = load_rules(path)?;
            let result = filter_tagged(records, &rules);
            (result.kept, result.dropped_by_tag)
        }
        None => (records, BTreeMap::new()),
    };

    write_records(&options.output, &records)?;
    info!(
        before = total_before,
        after = records.len(),
        output = %options.output.display(),
        "Filtered dataset"
    );

    Ok(FilterReport {
        total_before,
        dedup_steps: dedup.steps,
        excluded,
        dropped_by_tag,
        total_after: records.len(),
        output: options.output.clone(),
    })
}

/// Options for the chunk pass.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub input: PathBuf,
    pub manifest: PathBuf,
    pub output: PathBuf,
    pub seed: Option<u64>,
}

/// Counts from a chunk pass.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub entries: usize,
    pub filled: usize,
    pub short: Vec<ShortChunk>,
    pub records: usize,
    pub output: PathBuf,
}

/// Select manifest chunks from `options.input` into `options.output`.
pub fn run_chunk(options: &ChunkOptions) -> Result<ChunkReport, CurationError> {
    let specs = load_manifest(&options.manifest)?;
    let records = read_records(&options.input)?;
    let selection = select_chunks(&records, &specs, options.seed);
    write_records(&options.output, &selection.records)?;

    Ok(ChunkReport {
        entries: specs.len(),
        filled: selection.filled,
        short: selection.short,
        records: selection.records.len(),
        output: options.output.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_filter_end_to_end() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = temp_dir.path().join("generated.jsonl");
        let reference = temp_dir.path().join("reference.jsonl");
        let rules = temp_dir.path().join("tags.yaml");
        std::fs::write(
            &input,
            concat!(
                "{\"id\":\"1\",\"question\":\"a\",\"response\":\"fine\"}\n",
                "{\"id\":\"1\",\"question\":\"b\",\"response\":\"dup id\"}\n",
                "{\"id\":\"2\",\"question\":\"seen\",\"response\":\"fine\"}\n",
                "{\"id\":\"3\",\"question\":\"c\",\"response\":\"As an AI language model\"}\n",
                "{\"id\":\"4\",\"question\":\"d\",\"response\":\"fine\"}\n",
            ),
        )
        .expect("write input");
        std::fs::write(&reference, "{\"question\":\"seen\"}\n").expect("write reference");
        std::fs::write(&rules, "- name: refusal\n  pattern: \"(?i)as an ai\"\n")
            .expect("write rules");

        let mut options = FilterOptions::new(&input, temp_dir.path().join("out/filtered.jsonl"));
        options.exclude_from = Some(reference);
        options.tags = Some(rules);

        let report = run_filter(&options).expect("filter should succeed");
        assert_eq!(report.total_before, 5);
        assert_eq!(report.dedup_steps[0].after, 4);
        assert_eq!(report.excluded, 1);
        assert_eq!(report.dropped_by_tag["refusal"], 1);
        assert_eq!(report.total_after, 2);

        let kept = read_records(&options.output).expect("read output");
        let ids: Vec<&str> = kept.iter().filter_map(|r| r.get_str("id")).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn test_run_chunk_writes_selection() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = temp_dir.path().join("pool.jsonl");
        let manifest = temp_dir.path().join("prompts.json");
        std::fs::write(
            &input,
            concat!(
                "{\"id\":1,\"system_prompt\":\"s\",\"response\":\"x\"}\n",
                "{\"id\":2,\"system_prompt\":\"s\",\"response\":\"y\"}\n",
            ),
        )
        .expect("write input");
        std::fs::write(
            &manifest,
            r#"{"chuncks": [
                {"id": "s", "index": 0, "system_prompt": "s", "missing_count": 2},
                {"id": "t", "index": 1, "system_prompt": "t", "missing_count": 1}
            ]}"#,
        )
        .expect("write manifest");

        let options = ChunkOptions {
            input,
            manifest,
            output: temp_dir.path().join("to_run.jsonl"),
            seed: Some(3),
        };
        let report = run_chunk(&options).expect("chunk should succeed");
        assert_eq!(report.entries, 2);
        assert_eq!(report.filled, 1);
        assert_eq!(report.records, 2);
        assert_eq!(report.short[0].missing, 1);

        let written = read_records(&options.output).expect("read output");
        assert_eq!(written.len(), 2);
    }
}
