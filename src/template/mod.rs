//! Prompt templates for dataset augmentation.
//!
//! Templates are plain text files with `{field}` placeholders that are
//! resolved against a record's fields. A [`TemplateSet`] is loaded once at
//! startup and a [`TemplateRotator`] hands templates out in round-robin
//! order, one per admitted record.
//!
//! # Example
//!
//! ```ignore
//! use augment_forge::template::{TemplateRotator, TemplateSet};
//!
//! let set = TemplateSet::load_directory("templates/")?;
//! let mut rotator = TemplateRotator::new(set);
//!
//! let template = rotator.next_template();
//! let prompt = template.render(&record)?;
//! ```

pub mod render;
pub mod rotator;

pub use render::{render, PromptTemplate};
pub use rotator::{TemplateRotator, TemplateSet, TEMPLATE_EXTENSION};
