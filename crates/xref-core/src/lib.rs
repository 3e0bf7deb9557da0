//! Core infrastructure for xref.
//!
//! This crate provides the language-agnostic half of the analyzer:
//! - Token stream and the indexed Parsed File model
//! - Code defects, severities and report post-processing
//! - Plugin traits and the plugin registry
//! - Lint engines (per-file and whole-project) with result caching
//! - Incremental (revision-to-revision) reports
//! - Persistent storage with advisory locks
//! - File providers and the source-code-manager contract (git backend)
//! - Link database and documentation runner
//! - Error types and error codes

pub mod defect;
pub mod doc;
pub mod engine;
pub mod error;
pub mod file_provider;
pub mod links;
pub mod model;
pub mod parsed_file;
pub mod plugin;
pub mod project;
pub mod registry;
pub mod report;
pub mod scm;
pub mod storage;
pub mod token;
