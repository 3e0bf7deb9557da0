use xref_core::defect::Severity;
use xref_core::error::PluginError;
use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::{ErrorDescription, Finding, LintPlugin, Plugin};

const CODE_ASSIGNMENT_IN_CONDITION: &str = "ac01";

const CONDITION_KEYWORDS: &[&str] = &["if", "elseif", "while"];

/// `if ($a = $b)`. An extra pair of parentheses, `if (($a = f()))`, marks
/// the assignment as intended.
#[derive(Debug, Default)]
pub struct AssignmentInCondition;

impl Plugin for AssignmentInCondition {
    fn id(&self) -> &str {
        "php-lint-assignment-in-condition"
    }

    fn name(&self) -> &str {
        "Assignment in condition"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for AssignmentInCondition {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new(
            CODE_ASSIGNMENT_IN_CONDITION,
            Severity::Warning,
            "Assignment in a condition; use == for comparison or wrap it in extra parentheses",
        )]
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        let mut findings = Vec::new();
        for token in pf.tokens() {
            if !CONDITION_KEYWORDS.iter().any(|k| token.is_keyword(k)) {
                continue;
            }
            let Some(open) = pf.next_non_space(token.index).filter(|t| t.is("(")) else {
                continue;
            };
            let Some(close) = pf.paired_bracket(open.index) else {
                continue;
            };
            let mut depth = 0usize;
            for t in &pf.tokens()[open.index + 1..close] {
                if t.is_open_bracket() {
                    depth += 1;
                } else if t.is_close_bracket() {
                    depth = depth.saturating_sub(1);
                } else if depth == 0 && t.is("=") {
                    findings.push(Finding::new(t.index, CODE_ASSIGNMENT_IN_CONDITION));
                }
            }
        }
        Ok(findings)
    }
}
