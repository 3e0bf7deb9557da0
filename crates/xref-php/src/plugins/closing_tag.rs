use xref_core::defect::Severity;
use xref_core::error::PluginError;
use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::{ErrorDescription, Finding, LintPlugin, Plugin};
use xref_core::token::TokenKind;

const CODE_TRAILING_CLOSE_TAG: &str = "ct01";

/// A pure-PHP file ending in `?>`: any whitespace after it is sent to the
/// output.
#[derive(Debug, Default)]
pub struct ClosingTag;

impl Plugin for ClosingTag {
    fn id(&self) -> &str {
        "php-lint-closing-tag"
    }

    fn name(&self) -> &str {
        "Trailing closing tag"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for ClosingTag {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new(
            CODE_TRAILING_CLOSE_TAG,
            Severity::Notice,
            "File ends with a closing tag; omit it to avoid sending trailing whitespace",
        )]
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        let tokens = pf.tokens();
        let Some(last_close) = tokens.iter().rposition(|t| t.kind == TokenKind::CloseTag) else {
            return Ok(Vec::new());
        };
        let only_blank_after = tokens[last_close + 1..]
            .iter()
            .all(|t| t.kind == TokenKind::InlineHtml && t.text.trim().is_empty());
        let has_markup = tokens
            .iter()
            .any(|t| t.kind == TokenKind::InlineHtml && !t.text.trim().is_empty());
        if only_blank_after && !has_markup {
            Ok(vec![Finding::new(last_close, CODE_TRAILING_CLOSE_TAG)])
        } else {
            Ok(Vec::new())
        }
    }
}
