//! Plugin registry: parsers by extension, plugins by capability.
//!
//! The registry is an explicit object, built once at startup and then shared
//! read-only (behind an `Arc`) with every engine that needs lookups. Setup
//! mistakes (extension collisions, duplicate plugin ids) fail immediately with
//! a [`ConfigurationError`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::defect::{
    Severity, ERROR_CODE_CANT_PARSE_FILE, ERROR_CODE_DUPLICATE_CLASS, ERROR_CODE_PLUGIN_FAILED,
};
use crate::error::ParseError;
use crate::parsed_file::ParsedFile;
use crate::plugin::{
    Capability, DocumentationPlugin, ErrorDescription, FileParser, LintPlugin, Plugin,
    ProjectLintPlugin,
};

// ============================================================================
// Errors
// ============================================================================

/// A broken setup. Aborts the run before any file is processed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("parser for file extension '{extension}' already exists")]
    DuplicateParserExtension { extension: String },

    #[error("plugin '{id}' is already registered")]
    DuplicatePluginId { id: String },

    #[error("unknown value for config var 'lint.report-level': {value}")]
    UnknownReportLevel { value: String },

    #[error("invalid value '{value}' for config var '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("cannot read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

// ============================================================================
// Registry
// ============================================================================

struct RegisteredPlugin {
    plugin: Arc<dyn Plugin>,
    capabilities: BTreeSet<Capability>,
}

/// Parsers and plugins known to a run.
#[derive(Default)]
pub struct PluginRegistry {
    parsers: Vec<Arc<dyn FileParser>>,
    parser_by_extension: BTreeMap<String, usize>,
    plugins: Vec<RegisteredPlugin>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("extensions", &self.parser_by_extension.keys().collect::<Vec<_>>())
            .field("plugins", &self.plugin_ids())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser for all of its extensions.
    ///
    /// Fails without registering anything if any extension is already mapped.
    pub fn register_parser(&mut self, parser: Arc<dyn FileParser>) -> Result<(), ConfigurationError> {
        let extensions: Vec<String> = parser
            .supported_extensions()
            .iter()
            .map(|ext| normalize_extension(ext))
            .collect();

        let mut seen = BTreeSet::new();
        for ext in &extensions {
            if self.parser_by_extension.contains_key(ext) || !seen.insert(ext.clone()) {
                return Err(ConfigurationError::DuplicateParserExtension {
                    extension: ext.clone(),
                });
            }
        }

        let slot = self.parsers.len();
        self.parsers.push(parser);
        for ext in extensions {
            debug!(extension = %ext, "registered parser");
            self.parser_by_extension.insert(ext, slot);
        }
        Ok(())
    }

    /// Register a plugin, resolving its capabilities once.
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), ConfigurationError> {
        if self.plugins.iter().any(|p| p.plugin.id() == plugin.id()) {
            return Err(ConfigurationError::DuplicatePluginId {
                id: plugin.id().to_string(),
            });
        }
        let capabilities: BTreeSet<Capability> = Capability::ALL
            .into_iter()
            .filter(|c| c.is_implemented_by(plugin.as_ref()))
            .collect();
        debug!(plugin = plugin.id(), ?capabilities, "registered plugin");
        self.plugins.push(RegisteredPlugin {
            plugin,
            capabilities,
        });
        Ok(())
    }

    /// Drop every parser and plugin.
    pub fn reset(&mut self) {
        self.parsers.clear();
        self.parser_by_extension.clear();
        self.plugins.clear();
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Plugins declaring `capability`, in registration order.
    pub fn plugins_implementing(&self, capability: Capability) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .filter(|p| p.capabilities.contains(&capability))
            .map(|p| Arc::clone(&p.plugin))
            .collect()
    }

    pub fn lint_plugins(&self) -> Vec<(&str, &dyn LintPlugin)> {
        self.plugins
            .iter()
            .filter(|p| p.capabilities.contains(&Capability::Lint))
            .filter_map(|p| p.plugin.as_lint().map(|l| (p.plugin.id(), l)))
            .collect()
    }

    pub fn project_lint_plugins(&self) -> Vec<(&str, &dyn ProjectLintPlugin)> {
        self.plugins
            .iter()
            .filter(|p| p.capabilities.contains(&Capability::ProjectLint))
            .filter_map(|p| p.plugin.as_project_lint().map(|l| (p.plugin.id(), l)))
            .collect()
    }

    pub fn documentation_plugins(&self) -> Vec<(&str, &dyn DocumentationPlugin)> {
        self.plugins
            .iter()
            .filter(|p| p.capabilities.contains(&Capability::Documentation))
            .filter_map(|p| p.plugin.as_documentation().map(|d| (p.plugin.id(), d)))
            .collect()
    }

    pub fn plugin(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .find(|p| p.plugin.id() == id)
            .map(|p| Arc::clone(&p.plugin))
    }

    pub fn plugin_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.plugin.id()).collect()
    }

    /// Parser for a file, chosen by its extension (case-insensitive).
    pub fn parser_for(&self, file_name: &str) -> Option<&Arc<dyn FileParser>> {
        let ext = Path::new(file_name).extension()?.to_str()?;
        let slot = self.parser_by_extension.get(&normalize_extension(ext))?;
        self.parsers.get(*slot)
    }

    pub fn can_parse(&self, file_name: &str) -> bool {
        self.parser_for(file_name).is_some()
    }

    /// Parse a file with the parser registered for its extension.
    pub fn parse_file(&self, file_name: &str, content: &[u8]) -> Result<ParsedFile, ParseError> {
        match self.parser_for(file_name) {
            Some(parser) => parser.parse(content, file_name),
            None => Err(ParseError::new(
                format!("no parser registered for '{}'", file_name),
                0,
            )),
        }
    }

    /// Every error code this run can report: the engine's own codes followed
    /// by those of lint and project-lint plugins, keyed by code.
    pub fn error_map(&self) -> BTreeMap<String, ErrorDescription> {
        let mut map = BTreeMap::new();
        for desc in engine_error_map() {
            map.insert(desc.code.clone(), desc);
        }
        for (_, lint) in self.lint_plugins() {
            for desc in lint.error_map() {
                map.insert(desc.code.clone(), desc);
            }
        }
        for (_, lint) in self.project_lint_plugins() {
            for desc in lint.error_map() {
                map.insert(desc.code.clone(), desc);
            }
        }
        map
    }

    /// Identity of the registered plugin set, for cache keys.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for p in &self.plugins {
            hasher.update(p.plugin.id().as_bytes());
            hasher.update([0]);
            hasher.update(p.plugin.version().as_bytes());
            hasher.update([0]);
            for cap in &p.capabilities {
                hasher.update(format!("{:?}", cap).as_bytes());
            }
            hasher.update([0xff]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Codes reported by the engines themselves.
pub fn engine_error_map() -> Vec<ErrorDescription> {
    vec![
        ErrorDescription::new(ERROR_CODE_CANT_PARSE_FILE, Severity::Fatal, "Can't parse file"),
        ErrorDescription::new(ERROR_CODE_PLUGIN_FAILED, Severity::Fatal, "Plugin failed"),
        ErrorDescription::new(
            ERROR_CODE_DUPLICATE_CLASS,
            Severity::Error,
            "Class is declared more than once in the project",
        ),
    ]
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}
