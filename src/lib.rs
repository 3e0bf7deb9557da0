//! xref: a static analyzer and lint for PHP source trees.
//!
//! The analysis itself lives in the workspace crates:
//! - `xref-core`: parsed-file model, plugin registry, lint engines, caching,
//!   source control
//! - `xref-php`: PHP tokenizer, model builder and bundled plugins
//!
//! This crate adds what the command line needs on top: configuration
//! resolution, report output and the command implementations.

pub use xref_core::{defect, engine, error, report, scm};

pub mod cli;
pub mod config;
pub mod output;
