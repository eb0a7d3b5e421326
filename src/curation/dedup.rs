//! Exact-match deduplication and exclusion of records.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::dataset::Record;

/// Fields deduplicated on when none are configured, in order.
pub const DEFAULT_DEDUP_KEYS: [&str; 2] = ["id", "question"];

/// Field compared against the exclusion set when none is configured.
pub const DEFAULT_EXCLUDE_FIELD: &str = "question";

/// Counts for one deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupStep {
    pub key: String,
    pub before: usize,
    pub after: usize,
}

/// Result of a deduplication pass.
#[derive(Debug, Clone)]
pub struct DeduplicationResult {
    /// Records that survived every key, in input order.
    pub kept: Vec<Record>,

    /// Per-key counts, in the order the keys were applied.
    pub steps: Vec<DedupStep>,

    /// Total number of records before deduplication.
    pub total_before: usize,

    /// Total number of records after deduplication.
    pub total_after: usize,
}

impl DeduplicationResult {
    /// Returns the deduplication ratio (removed / total).
    pub fn dedup_ratio(&self) -> f64 {
        if self.total_before == 0 {
            return 0.0;
        }
        (self.total_before - self.total_after) as f64 / self.total_before as f64
    }

    /// Returns the retention ratio (kept / total).
    pub fn retention_ratio(&self) -> f64 {
        if self.total_before == 0 {
            return 1.0;
        }
        self.total_after as f64 / self.total_before as f64
    }
}

/// Comparison key for a field value: its compact JSON form, so values of
/// different types never collide (`1` and `"1"` are distinct).
pub fn value_key(value: &Value) -> String {
    value.to_string()
}

/// Drop records whose value for each key was already seen, keeping the
/// first occurrence.
///
/// Keys are applied one after another, so a record must be unique on the
/// first key among all records, then unique on the second among the
/// survivors. Records without a key are kept for that key.
pub fn deduplicate<S: AsRef<str>>(records: Vec<Record>, keys: &[S]) -> DeduplicationResult {
    let total_before = records.len();
    let mut kept = records;
    let mut steps = Vec::with_capacity(keys.len());

    for key in keys {
        let key = key.as_ref();
        let before = kept.len();
        let mut seen = HashSet::new();
        kept.retain(|record| match record.get(key) {
            Some(value) => seen.insert(value_key(value)),
            None => true,
        });
        info!(key, before, after = kept.len(), "Deduplicated");
        steps.push(DedupStep {
            key: key.to_string(),
            before,
            after: kept.len(),
        });
    }

    DeduplicationResult {
        total_after: kept.len(),
        kept,
        steps,
        total_before,
    }
}

/// Values of `field` across `records`, as comparison keys.
pub fn collect_field_values(records: &[Record], field: &str) -> HashSet<String> {
    records
        .iter()
        .filter_map(|record| record.get(field))
        .map(value_key)
        .collect()
}

/// Drop records whose `field` value is in `excluded`. Returns the number dropped.
pub fn exclude(records: &mut Vec<Record>, field: &str, excluded: &HashSet<String>) -> usize {
    let before = records.len();
    records.retain(|record| match record.get(field) {
        Some(value) => !excluded.contains(&value_key(value)),
        None => true,
    });
    let dropped = before - records.len();
    info!(field, dropped, remaining = records.len(), "Excluded records");
    dropped
}
