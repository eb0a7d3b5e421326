//! Loading prompt templates and cycling through them.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::render::PromptTemplate;
use crate::error::TemplateError;

/// File extension of template files.
pub const TEMPLATE_EXTENSION: &str = "txt";

/// Ordered, non-empty collection of prompt templates.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: Vec<Arc<PromptTemplate>>,
}

impl TemplateSet {
    /// Build a set from already parsed templates, in the given order.
    pub fn new(templates: Vec<PromptTemplate>) -> Result<Self, TemplateError> {
        if templates.is_empty() {
            return Err(TemplateError::Empty("<in-memory>".to_string()));
        }
        Ok(Self {
            templates: templates.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load every `*.txt` file in `dir` (non-recursive).
    ///
    /// Files are ordered by file name so the rotation is reproducible
    /// across runs and platforms. Contents are trimmed of surrounding
    /// whitespace.
    pub fn load_directory<P: AsRef<Path>>(dir: P) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(TemplateError::NotFound(dir.display().to_string()));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_template = path.is_file()
                && path
                    .extension()
                    .map(|ext| ext == TEMPLATE_EXTENSION)
                    .unwrap_or(false);
            if is_template {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templates = Vec::with_capacity(paths.len());
        for path in &paths {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = fs::read_to_string(path)?;
            let template = PromptTemplate::parse(name, content.trim())?;
            debug!(
                template = template.name(),
                placeholders = template.placeholders().count(),
                "Loaded template"
            );
            templates.push(Arc::new(template));
        }

        if templates.is_empty() {
            return Err(TemplateError::Empty(dir.display().to_string()));
        }

        info!(count = templates.len(), dir = %dir.display(), "Loaded templates");
        Ok(Self { templates })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Always false: a set holds at least one template.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PromptTemplate> {
        self.templates.iter().map(|t| t.as_ref())
    }
}

/// Deterministic round-robin over a [`TemplateSet`].
#[derive(Debug, Clone)]
pub struct TemplateRotator {
    set: TemplateSet,
    cursor: usize,
}

impl TemplateRotator {
    pub fn new(set: TemplateSet) -> Self {
        Self { set, cursor: 0 }
    }

    /// Return the current template and advance the cursor, wrapping at the end.
    pub fn next_template(&mut self) -> Arc<PromptTemplate> {
        let template = Arc::clone(&self.set.templates[self.cursor]);
        self.cursor = (self.cursor + 1) % self.set.templates.len();
        template
    }

    /// Position of the template the next call will return.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.set
    }
}
