//! Code defects, severities and file positions.
//!
//! A [`CodeDefect`] is a detached value: it is built from a live Parsed File
//! at detection time and holds no reference back into it, so it can be cached,
//! serialized and compared across revisions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::parsed_file::ParsedFile;
use crate::registry::ConfigurationError;

/// Pseudo file name for project-level defects.
pub const PROJECT_FILE_NAME: &str = "(project)";

/// Error code: the file could not be parsed.
pub const ERROR_CODE_CANT_PARSE_FILE: &str = "xr001";
/// Error code: a plugin failed while analyzing a file.
pub const ERROR_CODE_PLUGIN_FAILED: &str = "xr002";
/// Error code: the same class is declared more than once in the project.
pub const ERROR_CODE_DUPLICATE_CLASS: &str = "xr003";

// ============================================================================
// Severity
// ============================================================================

/// Ordered defect importance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Notice = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Severity::Notice),
            2 => Some(Severity::Warning),
            3 => Some(Severity::Error),
            4 => Some(Severity::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a report-level setting: `errors`, `warnings`, `notices` (singular
/// forms too), `fatal`, or a numeric level.
impl FromStr for Severity {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        let parsed = match value.as_str() {
            "notice" | "notices" => Some(Severity::Notice),
            "warning" | "warnings" => Some(Severity::Warning),
            "error" | "errors" => Some(Severity::Error),
            "fatal" => Some(Severity::Fatal),
            other => other.parse::<u8>().ok().and_then(Severity::from_level),
        };
        parsed.ok_or_else(|| ConfigurationError::UnknownReportLevel {
            value: s.to_string(),
        })
    }
}

// ============================================================================
// File Position
// ============================================================================

/// Where a token range sits in a file. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePosition {
    pub file_name: String,
    pub line_number: u32,
    pub in_class: Option<String>,
    pub in_method: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
}

impl FilePosition {
    /// Position of the token range `start..=end` (`end` defaults to `start`).
    pub fn new(pf: &ParsedFile, start: usize, end: Option<usize>) -> Self {
        FilePosition {
            file_name: pf.file_name().to_string(),
            line_number: pf.line_number_at(start),
            in_class: pf.class_at(start).map(|c| c.name.clone()),
            in_method: pf.function_at(start).and_then(|f| f.name.clone()),
            start_index: start,
            end_index: end.unwrap_or(start),
        }
    }
}

// ============================================================================
// Code Defect
// ============================================================================

/// One finding, detached from the parse tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDefect {
    pub token_text: String,
    pub error_code: String,
    pub severity: Severity,
    pub message: String,
    pub file_name: String,
    pub line_number: u32,
    pub in_class: Option<String>,
    pub in_method: Option<String>,
}

impl CodeDefect {
    /// Build a defect for the token at `index` of a live file.
    pub fn from_token(
        pf: &ParsedFile,
        index: usize,
        error_code: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        let position = FilePosition::new(pf, index, None);
        let token_text = pf
            .token_at(index)
            .map(|t| escape_token_text(&t.text))
            .unwrap_or_default();
        CodeDefect {
            token_text,
            error_code: error_code.into(),
            severity,
            message: message.into(),
            file_name: position.file_name,
            line_number: position.line_number,
            in_class: position.in_class,
            in_method: position.in_method,
        }
    }

    /// A defect not tied to a live token (parse failures, plugin failures,
    /// project-level findings).
    pub fn detached(
        file_name: impl Into<String>,
        line_number: u32,
        token_text: impl Into<String>,
        error_code: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        CodeDefect {
            token_text: escape_token_text(&token_text.into()),
            error_code: error_code.into(),
            severity,
            message: message.into(),
            file_name: file_name.into(),
            line_number,
            in_class: None,
            in_method: None,
        }
    }

    pub fn with_context(mut self, in_class: Option<String>, in_method: Option<String>) -> Self {
        self.in_class = in_class;
        self.in_method = in_method;
        self
    }

    /// Line-independent identity used to match defects across revisions.
    pub fn signature(&self) -> DefectSignature {
        DefectSignature {
            error_code: self.error_code.clone(),
            token_text: normalize_token_text(&self.token_text),
            in_class: self.in_class.clone(),
            in_method: self.in_method.clone(),
        }
    }
}

/// Identity of a defect for incremental comparison. Line numbers are not part
/// of it: they shift whenever unrelated lines are inserted above.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefectSignature {
    pub error_code: String,
    pub token_text: String,
    pub in_class: Option<String>,
    pub in_method: Option<String>,
}

/// Replace bytes outside printable ASCII with `\xNN`.
pub fn escape_token_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if (0x20..0x7f).contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\x{:02X}", byte));
        }
    }
    out
}

/// Collapse runs of whitespace (escaped or literal) into a single space.
fn normalize_token_text(text: &str) -> String {
    let unescaped = text
        .replace("\\x0A", " ")
        .replace("\\x0D", " ")
        .replace("\\x09", " ");
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}
