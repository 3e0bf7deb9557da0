use xref_core::defect::Severity;
use xref_core::error::PluginError;
use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::{ErrorDescription, Finding, LintPlugin, Plugin};
use xref_core::token::TokenKind;

const CODE_LITERAL_CASE: &str = "lc01";

/// `TRUE`, `False`, `NULL` instead of `true`, `false`, `null`.
#[derive(Debug, Default)]
pub struct LowerCaseLiterals;

impl Plugin for LowerCaseLiterals {
    fn id(&self) -> &str {
        "php-lint-literals"
    }

    fn name(&self) -> &str {
        "Lower-case literals"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for LowerCaseLiterals {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new(
            CODE_LITERAL_CASE,
            Severity::Notice,
            "true, false and null should be written in lower case",
        )]
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        let findings = pf
            .tokens()
            .iter()
            .filter(|t| t.kind == TokenKind::Name)
            .filter(|t| {
                let lower = t.text.to_ascii_lowercase();
                matches!(lower.as_str(), "true" | "false" | "null") && t.text != lower
            })
            .filter(|t| !is_member_or_qualified(pf, t.index))
            .map(|t| Finding::new(t.index, CODE_LITERAL_CASE))
            .collect();
        Ok(findings)
    }
}

/// `$a->NULL`, `A::TRUE`, `Foo\NULL` are names, not literals.
fn is_member_or_qualified(pf: &ParsedFile, index: usize) -> bool {
    pf.prev_non_space(index)
        .is_some_and(|p| p.is("->") || p.is("?->") || p.is("::") || p.kind == TokenKind::NsSeparator)
}
