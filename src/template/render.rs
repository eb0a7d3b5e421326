//! Placeholder substitution for prompt templates.
//!
//! A template is literal text with `{field}` placeholders. `{{` and `}}`
//! stand for literal braces. Templates are parsed once at load time so that
//! a malformed template is a startup error rather than a per-record one.

use serde_json::Value;

use crate::dataset::Record;
use crate::error::TemplateError;

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed, immutable prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Template name, usually the file stem it was loaded from.
    name: String,
    /// The template text exactly as loaded.
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse template text.
    ///
    /// Fails with [`TemplateError::Malformed`] on an unmatched brace or an
    /// empty `{}` placeholder.
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> Result<Self, TemplateError> {
        let name = name.into();
        let source = source.into();
        let segments = parse_segments(&name, &source)?;
        Ok(Self {
            name,
            source,
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance (duplicates included).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(field) => Some(field.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render the template against a record.
    ///
    /// String fields are inserted verbatim; every other JSON value is
    /// inserted as compact JSON.
    pub fn render(&self, record: &Record) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(field) => {
                    let value = record.get(field).ok_or_else(|| TemplateError::MissingField {
                        field: field.clone(),
                    })?;
                    push_value(&mut out, value);
                }
            }
        }
        Ok(out)
    }
}

/// Render `template` against `record`.
pub fn render(record: &Record, template: &PromptTemplate) -> Result<String, TemplateError> {
    template.render(record)
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

fn parse_segments(name: &str, source: &str) -> Result<Vec<Segment>, TemplateError> {
    let malformed = |message: String| TemplateError::Malformed {
        name: name.to_string(),
        message,
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(malformed(format!("nested '{{' in placeholder at byte {pos}")))
                        }
                        _ => field.push(c),
                    }
                }
                if !closed {
                    return Err(malformed(format!("unclosed '{{' at byte {pos}")));
                }
                if field.trim().is_empty() {
                    return Err(malformed(format!("empty placeholder at byte {pos}")));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(field));
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(malformed(format!("unmatched '}}' at byte {pos}"))),
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).expect("object should deserialize")
    }

    #[test]
    fn test_render_substitutes_fields() {
        let template = PromptTemplate::parse("qa", "Q: {question}\nA:").expect("valid template");
        let rendered = template
            .render(&record(json!({"question": "What is 2+2?", "idx": 0})))
            .expect("render should succeed");
        assert_eq!(rendered, "Q: What is 2+2?\nA:");
    }

    #[test]
    fn test_render_missing_field() {
        let template =
            PromptTemplate::parse("qa", "{system_prompt} / {question}").expect("valid template");
        let result = template.render(&record(json!({"question": "x"})));
        match result {
            Err(TemplateError::MissingField { field }) => assert_eq!(field, "system_prompt"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_render_non_string_values_as_json() {
        let template =
            PromptTemplate::parse("t", "{n} {flag} {tags} {meta} {none}").expect("valid template");
        let rendered = template
            .render(&record(json!({
                "n": 3,
                "flag": true,
                "tags": ["a", "b"],
                "meta": {"k": 1},
                "none": null
            })))
            .expect("render should succeed");
        assert_eq!(rendered, r#"3 true ["a","b"] {"k":1} null"#);
    }

    #[test]
    fn test_escaped_braces() {
        let template =
            PromptTemplate::parse("json", "Return {{\"answer\": {answer}}}").expect("valid template");
        assert_eq!(template.placeholders().collect::<Vec<_>>(), vec!["answer"]);
        let rendered = template
            .render(&record(json!({"answer": "42"})))
            .expect("render should succeed");
        assert_eq!(rendered, "Return {\"answer\": 42}");
    }

    #[test]
    fn test_malformed_templates() {
        for source in ["open {question", "close }", "empty {}", "nested {a{b}}"] {
            let result = PromptTemplate::parse("bad", source);
            assert!(
                matches!(result, Err(TemplateError::Malformed { .. })),
                "expected malformed for {:?}",
                source
            );
        }
    }

    #[test]
    fn test_template_without_placeholders() {
        let template = PromptTemplate::parse("plain", "Just text").expect("valid template");
        assert_eq!(template.placeholders().count(), 0);
        assert_eq!(
            render(&Record::new(), &template).expect("render should succeed"),
            "Just text"
        );
    }
}
