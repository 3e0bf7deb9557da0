//! Error types and error code constants for xref.
//!
//! This module provides a unified error type (`XrefError`) that bridges
//! domain-specific errors from the different subsystems (registry, storage,
//! source control, file providers) into a common format suitable for CLI
//! output, plus the two per-file error kinds that the lint engines turn into
//! fatal defects instead of propagating.
//!
//! ## Error Code Mapping
//!
//! Exit codes:
//! - `1`: Lint defects at warning level or above were reported (not an error)
//! - `2`: Invalid arguments or configuration (bad setup, aborts before any file)
//! - `3`: Resolution errors (revision or file not found, source control failure)
//! - `4`: Storage errors surfaced outside the cache path
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Unified type**: `XrefError` is the single error type for CLI output
//! - **Bridging**: `impl From<X> for XrefError` bridges domain errors
//! - **Code mapping**: `OutputErrorCode` provides stable integer exit codes

use std::fmt;

use thiserror::Error;

use crate::file_provider::FileProviderError;
use crate::registry::ConfigurationError;
use crate::scm::ScmError;
use crate::storage::StorageError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments or configuration.
    InvalidArguments = 2,
    /// Resolution errors (revision not found, file not found, git failure).
    ResolutionError = 3,
    /// Storage errors outside the cache path.
    StorageError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Per-file Errors
// ============================================================================

/// Malformed source: the file cannot be turned into a Parsed File.
///
/// Carries enough position information to produce a single fatal defect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Best-effort 1-based line number, 0 when unknown.
    pub line_number: u32,
    /// Byte offset into the source, when known.
    pub offset: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line_number: u32) -> Self {
        ParseError {
            message: message.into(),
            line_number,
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A plugin failed while analyzing one file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("plugin '{plugin_id}' failed: {message}")]
pub struct PluginError {
    pub plugin_id: String,
    pub message: String,
}

impl PluginError {
    pub fn new(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        PluginError {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum XrefError {
    /// Invalid command-line arguments.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Broken setup: duplicate plugin, bad config value, unreadable config file.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Revision or path could not be found.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Source control backend failure.
    #[error("source control error: {message}")]
    SourceControl { message: String },

    /// Storage failure outside the cache path.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&XrefError> for OutputErrorCode {
    fn from(err: &XrefError) -> Self {
        match err {
            XrefError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            XrefError::Configuration(_) => OutputErrorCode::InvalidArguments,
            XrefError::NotFound { .. } => OutputErrorCode::ResolutionError,
            XrefError::SourceControl { .. } => OutputErrorCode::ResolutionError,
            XrefError::Storage { .. } => OutputErrorCode::StorageError,
            XrefError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<XrefError> for OutputErrorCode {
    fn from(err: XrefError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<ScmError> for XrefError {
    fn from(err: ScmError) -> Self {
        match err {
            ScmError::NotFound { .. } | ScmError::InvalidRevision { .. } => XrefError::NotFound {
                message: err.to_string(),
            },
            other => XrefError::SourceControl {
                message: other.to_string(),
            },
        }
    }
}

impl From<StorageError> for XrefError {
    fn from(err: StorageError) -> Self {
        XrefError::Storage {
            message: err.to_string(),
        }
    }
}

impl From<FileProviderError> for XrefError {
    fn from(err: FileProviderError) -> Self {
        match err {
            FileProviderError::NotFound { path } => XrefError::NotFound {
                message: format!("file not found: {}", path),
            },
            FileProviderError::InvalidPattern { pattern, reason } => {
                XrefError::Configuration(ConfigurationError::InvalidValue {
                    key: "project.exclude-path".to_string(),
                    value: pattern,
                    reason,
                })
            }
            FileProviderError::Scm(scm) => XrefError::from(scm),
            FileProviderError::Io { path, source } => XrefError::InternalError {
                message: format!("IO error reading {}: {}", path, source),
            },
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl XrefError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        XrefError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        XrefError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn configuration_maps_to_invalid_arguments() {
            let err = XrefError::from(ConfigurationError::DuplicatePluginId {
                id: "lint-static-this".to_string(),
            });
            assert_eq!(
                OutputErrorCode::from(&err),
                OutputErrorCode::InvalidArguments
            );
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn scm_not_found_maps_to_resolution_error() {
            let err = XrefError::from(ScmError::NotFound {
                revision: "HEAD".to_string(),
                path: "a.php".to_string(),
            });
            assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn scm_timeout_maps_to_resolution_error() {
            let err = XrefError::from(ScmError::Timeout {
                command: "git fetch".to_string(),
                seconds: 30,
            });
            assert!(matches!(err, XrefError::SourceControl { .. }));
            assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
        }

        #[test]
        fn provider_pattern_maps_to_configuration() {
            let err = XrefError::from(FileProviderError::InvalidPattern {
                pattern: "[".to_string(),
                reason: "unclosed class".to_string(),
            });
            assert!(matches!(err, XrefError::Configuration(_)));
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn internal_error_maps_to_internal_error() {
            let err = XrefError::internal("unexpected state");
            assert_eq!(err.error_code().code(), 10);
        }
    }

    mod error_display {
        use super::*;

        #[test]
        fn invalid_arguments_display() {
            let err = XrefError::invalid_args("missing revision");
            assert_eq!(err.to_string(), "invalid arguments: missing revision");
        }

        #[test]
        fn plugin_error_display() {
            let err = PluginError::new("lint-closing-tag", "boom");
            assert_eq!(err.to_string(), "plugin 'lint-closing-tag' failed: boom");
        }

        #[test]
        fn parse_error_display_is_message() {
            let err = ParseError::new("unmatched ')'", 3).with_offset(17);
            assert_eq!(err.to_string(), "unmatched ')'");
            assert_eq!(err.line_number, 3);
            assert_eq!(err.offset, Some(17));
        }
    }
}
