//! The PHP [`FileParser`].

use tracing::debug;

use xref_core::error::ParseError;
use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::FileParser;

use crate::builder::build_model;
use crate::lexer::tokenize;

/// Tokenizes and models `.php` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhpParser;

impl PhpParser {
    pub fn new() -> Self {
        PhpParser
    }
}

impl FileParser for PhpParser {
    fn supported_extensions(&self) -> Vec<String> {
        vec!["php".to_string()]
    }

    fn parse(&self, content: &[u8], file_name: &str) -> Result<ParsedFile, ParseError> {
        let tokens = tokenize(content)?;
        let model = build_model(&tokens)?;
        debug!(
            file = file_name,
            tokens = tokens.len(),
            classes = model.classes.len(),
            functions = model.functions.len(),
            "parsed"
        );
        Ok(ParsedFile::new(file_name, tokens, model))
    }
}
