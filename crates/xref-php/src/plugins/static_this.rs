use xref_core::defect::Severity;
use xref_core::error::PluginError;
use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::{ErrorDescription, Finding, LintPlugin, Plugin};
use xref_core::token::TokenKind;

const CODE_THIS_IN_STATIC: &str = "st01";

/// `$this` inside a static method.
#[derive(Debug, Default)]
pub struct StaticThis;

impl Plugin for StaticThis {
    fn id(&self) -> &str {
        "php-lint-static-this"
    }

    fn name(&self) -> &str {
        "$this in static context"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for StaticThis {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new(
            CODE_THIS_IN_STATIC,
            Severity::Error,
            "$this is used in a static method",
        )]
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        let mut findings = Vec::new();
        for method in pf.functions().iter().filter(|f| f.is_method()) {
            if !method.attributes.is_static() {
                continue;
            }
            let Some(start) = method.body_starts else {
                continue;
            };
            for token in &pf.tokens()[start..=method.body_ends] {
                if token.kind != TokenKind::Variable || token.text != "$this" {
                    continue;
                }
                // Closures and anonymous classes bind their own $this.
                let owner = pf.function_at(token.index);
                if owner.is_some_and(|f| f.index == method.index) {
                    findings.push(Finding::new(token.index, CODE_THIS_IN_STATIC));
                }
            }
        }
        Ok(findings)
    }
}
