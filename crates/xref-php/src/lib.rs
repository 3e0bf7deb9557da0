//! PHP support for xref.
//!
//! - [`lexer`]: source bytes to tokens
//! - [`builder`]: tokens to the structural model
//! - [`parser`]: the [`FileParser`](xref_core::plugin::FileParser) tying the two together
//! - [`plugins`]: bundled lint, project-lint and documentation plugins

pub mod builder;
pub mod lexer;
pub mod parser;
pub mod plugins;

use std::sync::Arc;

use xref_core::registry::{ConfigurationError, PluginRegistry};

pub use parser::PhpParser;

/// Class names the missing-class check never reports by default.
pub const DEFAULT_IGNORE_MISSING_CLASS: &[&str] = &["PEAR", "PHPUnit_Framework_TestCase"];

/// Settings consumed by the bundled plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhpOptions {
    pub ignore_missing_class: Vec<String>,
}

impl Default for PhpOptions {
    fn default() -> Self {
        PhpOptions {
            ignore_missing_class: DEFAULT_IGNORE_MISSING_CLASS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Register the PHP parser and every bundled plugin.
pub fn register_defaults(
    registry: &mut PluginRegistry,
    options: &PhpOptions,
) -> Result<(), ConfigurationError> {
    registry.register_parser(Arc::new(PhpParser::new()))?;
    registry.register_plugin(Arc::new(plugins::LowerCaseLiterals))?;
    registry.register_plugin(Arc::new(plugins::StaticThis))?;
    registry.register_plugin(Arc::new(plugins::AssignmentInCondition))?;
    registry.register_plugin(Arc::new(plugins::ClosingTag))?;
    registry.register_plugin(Arc::new(plugins::UnusedVariables))?;
    registry.register_plugin(Arc::new(plugins::MissingClass::new(
        &options.ignore_missing_class,
    )))?;
    registry.register_plugin(Arc::new(plugins::ParentConstructor))?;
    registry.register_plugin(Arc::new(plugins::DeclarationIndex::new()))?;
    Ok(())
}
