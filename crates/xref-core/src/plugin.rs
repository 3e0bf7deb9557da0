//! Plugin and parser traits.
//!
//! A plugin is one logical unit with a unique id. What it can do is expressed
//! through typed capability views (`as_lint`, `as_project_lint`,
//! `as_documentation`) which the registry resolves once, at registration.

use serde::{Deserialize, Serialize};

use crate::defect::{CodeDefect, Severity};
use crate::error::{ParseError, PluginError};
use crate::links::LinkDatabase;
use crate::parsed_file::ParsedFile;
use crate::project::ProjectDatabase;

// ============================================================================
// Capabilities
// ============================================================================

/// Closed set of things a plugin can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Per-file lint.
    Lint,
    /// Whole-project lint over the project database.
    ProjectLint,
    /// Documentation / cross-reference output.
    Documentation,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Lint,
        Capability::ProjectLint,
        Capability::Documentation,
    ];

    pub fn is_implemented_by(self, plugin: &dyn Plugin) -> bool {
        match self {
            Capability::Lint => plugin.as_lint().is_some(),
            Capability::ProjectLint => plugin.as_project_lint().is_some(),
            Capability::Documentation => plugin.as_documentation().is_some(),
        }
    }
}

// ============================================================================
// Parsers
// ============================================================================

/// Turns raw file content into a [`ParsedFile`].
pub trait FileParser: Send + Sync {
    /// Extensions handled by this parser, without the leading dot.
    fn supported_extensions(&self) -> Vec<String>;

    /// Parse `content`. Must return an error, never panic, on malformed input.
    fn parse(&self, content: &[u8], file_name: &str) -> Result<ParsedFile, ParseError>;
}

// ============================================================================
// Plugins
// ============================================================================

/// Static description of one error code a plugin may report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub code: String,
    pub severity: Severity,
    pub message: String,
}

impl ErrorDescription {
    pub fn new(code: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        ErrorDescription {
            code: code.into(),
            severity,
            message: message.into(),
        }
    }
}

/// A per-file finding: the token it points at and the error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finding<'a> {
    pub index: usize,
    pub error_code: &'a str,
}

impl<'a> Finding<'a> {
    pub fn new(index: usize, error_code: &'a str) -> Self {
        Finding { index, error_code }
    }
}

/// Base trait of every plugin.
pub trait Plugin: Send + Sync {
    /// Unique id; also the report id under which results are filed.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Bumped whenever the plugin's output for the same input may change.
    /// Part of the cache fingerprint.
    fn version(&self) -> &str {
        "1"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        None
    }

    fn as_project_lint(&self) -> Option<&dyn ProjectLintPlugin> {
        None
    }

    fn as_documentation(&self) -> Option<&dyn DocumentationPlugin> {
        None
    }
}

/// Per-file lint.
pub trait LintPlugin: Send + Sync {
    /// Every error code this plugin can report.
    fn error_map(&self) -> Vec<ErrorDescription>;

    /// Findings for one file.
    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError>;
}

/// Whole-project lint, run once after the project database is complete.
pub trait ProjectLintPlugin: Send + Sync {
    fn error_map(&self) -> Vec<ErrorDescription>;

    fn project_report(&self, db: &ProjectDatabase) -> Result<Vec<CodeDefect>, PluginError>;
}

/// One generated documentation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    pub object_id: String,
    pub content: String,
}

/// Documentation / cross-reference output.
///
/// File reports are accumulated by the plugin itself; the total report is
/// produced once every file has been seen.
pub trait DocumentationPlugin: Send + Sync {
    fn generate_file_report(
        &self,
        pf: &ParsedFile,
        links: &mut LinkDatabase,
    ) -> Result<(), PluginError>;

    fn generate_total_report(&self) -> Result<Vec<DocumentPage>, PluginError>;

    /// Relative link to a report page for `object_id`, if this plugin produced one.
    fn report_link(&self, links: &LinkDatabase, object_id: &str, root: &str) -> Option<String>;
}
