//! Command-line interface for augment-forge.
//!
//! Provides commands for running an augmentation, indexing a dataset on
//! its own, and the offline curation passes.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
