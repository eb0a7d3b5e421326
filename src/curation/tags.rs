//! Tag rules that flag records for removal.
//!
//! A record is dropped when any rule in the set matches it. Rules are
//! behind the [`TagRule`] trait; the built-in [`RegexTagRule`] is loaded
//! from a YAML list:
//!
//! ```yaml
//! - name: refusal
//!   pattern: "(?i)as an ai language model"
//! - name: empty_response
//!   pattern: "^\\s*$"
//!   fields: [response]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::Record;
use crate::error::CurationError;

/// String fields a rule is tested against when it names none.
pub const DEFAULT_TAG_FIELDS: [&str; 3] = ["question", "response", "system_prompt"];

/// A named predicate over records.
pub trait TagRule: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the record carries this tag.
    fn matches(&self, record: &Record) -> bool;
}

/// One rule as written in a rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRuleSpec {
    pub name: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// Tags a record when `pattern` matches any of its `fields`.
///
/// Fields that are absent or not strings never match.
#[derive(Debug, Clone)]
pub struct RegexTagRule {
    name: String,
    pattern: Regex,
    fields: Vec<String>,
}

impl RegexTagRule {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        fields: Vec<String>,
    ) -> Result<Self, CurationError> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| CurationError::InvalidRule {
            name: name.clone(),
            message: e.to_string(),
        })?;
        if fields.is_empty() {
            return Err(CurationError::InvalidRule {
                name,
                message: "rule must test at least one field".to_string(),
            });
        }
        Ok(Self {
            name,
            pattern,
            fields,
        })
    }

    pub fn from_spec(spec: &TagRuleSpec) -> Result<Self, CurationError> {
        let fields = spec.fields.clone().unwrap_or_else(|| {
            DEFAULT_TAG_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect()
        });
        Self::new(&spec.name, &spec.pattern, fields)
    }
}

impl TagRule for RegexTagRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, record: &Record) -> bool {
        self.fields
            .iter()
            .filter_map(|field| record.get_str(field))
            .any(|text| self.pattern.is_match(text))
    }
}

/// Parse a YAML list of rule specs into rules.
pub fn parse_rules(yaml: &str) -> Result<Vec<Box<dyn TagRule>>, CurationError> {
    let specs: Vec<TagRuleSpec> = serde_yaml::from_str(yaml)?;
    specs
        .iter()
        .map(|spec| RegexTagRule::from_spec(spec).map(|rule| Box::new(rule) as Box<dyn TagRule>))
        .collect()
}

/// Load rules from a YAML file.
pub fn load_rules(path: &Path) -> Result<Vec<Box<dyn TagRule>>, CurationError> {
    let rules = parse_rules(&std::fs::read_to_string(path)?)?;
    info!(path = %path.display(), count = rules.len(), "Loaded tag rules");
    Ok(rules)
}

/// Result of a tag filtering pass.
#[derive(Debug, Clone)]
pub struct TagFilterResult {
    pub kept: Vec<Record>,
    /// Records dropped per tag. A record is counted under the first rule
    /// that matched it.
    pub dropped_by_tag: BTreeMap<String, usize>,
}

impl TagFilterResult {
    pub fn dropped(&self) -> usize {
        self.dropped_by_tag.values().sum()
    }
}

/// Drop every record that any rule matches.
pub fn filter_tagged(records: Vec<Record>, rules: &[Box<dyn TagRule>]) -> TagFilterResult {
    let mut dropped_by_tag: BTreeMap<String, usize> = rules
        .iter()
        .map(|rule| (rule.name().to_string(), 0))
        .collect();

    let kept = records
        .into_iter()
        .filter(|record| match rules.iter().find(|rule| rule.matches(record)) {
            Some(rule) => {
                debug!(tag = rule.name(), "Dropping tagged record");
                *dropped_by_tag.entry(rule.name().to_string()).or_default() += 1;
                false
            }
            None => true,
        })
        .collect();

    TagFilterResult {
        kept,
        dropped_by_tag,
    }
}
