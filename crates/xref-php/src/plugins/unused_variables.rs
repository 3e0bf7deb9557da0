//! Variables that are assigned inside a function but never read.
//!
//! The check is local to one function body. Closures are separate scopes:
//! their own variables are checked on their own, while names in a closure's
//! `use (...)` list count as reads in the enclosing function. Functions that
//! can touch variables by name (`compact`, `extract`, `$$name`, ...) are
//! skipped entirely.

use std::collections::{BTreeMap, BTreeSet};

use xref_core::defect::Severity;
use xref_core::error::PluginError;
use xref_core::model::Function;
use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::{ErrorDescription, Finding, LintPlugin, Plugin};
use xref_core::token::TokenKind;

const CODE_UNUSED_VARIABLE: &str = "uv01";

const SUPERGLOBALS: &[&str] = &[
    "$this", "$GLOBALS", "$_SERVER", "$_GET", "$_POST", "$_FILES", "$_COOKIE", "$_SESSION",
    "$_REQUEST", "$_ENV", "$http_response_header", "$argc", "$argv",
];

/// Calls that read or write the local symbol table by name.
const DYNAMIC_SCOPE_FUNCTIONS: &[&str] = &["compact", "extract", "get_defined_vars", "eval", "parse_str"];

#[derive(Debug, Default)]
pub struct UnusedVariables;

impl Plugin for UnusedVariables {
    fn id(&self) -> &str {
        "php-lint-unused-variables"
    }

    fn name(&self) -> &str {
        "Unused variables"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for UnusedVariables {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new(
            CODE_UNUSED_VARIABLE,
            Severity::Warning,
            "Variable is assigned but never used",
        )]
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        let mut findings = Vec::new();
        for function in pf.functions() {
            findings.extend(
                unused_in(pf, function)
                    .into_iter()
                    .map(|index| Finding::new(index, CODE_UNUSED_VARIABLE)),
            );
        }
        findings.sort_by_key(|f| f.index);
        Ok(findings)
    }
}

#[derive(Default)]
struct Usage {
    first_assignment: Option<usize>,
    read: bool,
}

/// First assignment token of every write-only local of `function`.
fn unused_in(pf: &ParsedFile, function: &Function) -> Vec<usize> {
    let Some(start) = function.body_starts else {
        return Vec::new();
    };
    let tokens = pf.tokens();
    let mut usages: BTreeMap<&str, Usage> = BTreeMap::new();
    let mut exempt: BTreeSet<&str> = function
        .parameters
        .iter()
        .chain(&function.used_variables)
        .map(|p| p.name.as_str())
        .collect();

    let mut i = start;
    while i <= function.body_ends && i < tokens.len() {
        let token = &tokens[i];

        let owner = pf.function_at(i);
        if let Some(inner) = owner.filter(|f| f.index != function.index) {
            let direct_child = inner.index > 0
                && pf
                    .function_at(inner.index - 1)
                    .is_some_and(|p| p.index == function.index);
            if direct_child {
                if i == inner.index {
                    for used in &inner.used_variables {
                        usages.entry(used.name.as_str()).or_default().read = true;
                    }
                }
                // Arrow functions capture the enclosing scope implicitly.
                if tokens[inner.index].is_keyword("fn") && token.kind == TokenKind::Variable {
                    usages.entry(token.text.as_str()).or_default().read = true;
                }
            }
            i += 1;
            continue;
        }

        match token.kind {
            TokenKind::Punct if token.is("$") => return Vec::new(),
            TokenKind::Name
                if DYNAMIC_SCOPE_FUNCTIONS.iter().any(|f| token.is_word(f))
                    && pf.next_non_space(i).is_some_and(|t| t.is("(")) =>
            {
                return Vec::new();
            }
            TokenKind::Keyword if token.is_keyword("global") || token.is_keyword("static") => {
                // `global $a, $b;` and `static $n = 0;` bind names from elsewhere.
                let mut j = i + 1;
                while j < tokens.len() && !tokens[j].is_terminator() {
                    if tokens[j].kind == TokenKind::Variable {
                        exempt.insert(tokens[j].text.as_str());
                    }
                    j += 1;
                }
            }
            TokenKind::Variable => {
                let usage = usages.entry(token.text.as_str()).or_default();
                if is_plain_assignment(pf, i) {
                    usage.first_assignment.get_or_insert(i);
                } else {
                    usage.read = true;
                }
            }
            TokenKind::String | TokenKind::Heredoc => {
                for name in interpolated_variables(&token.text) {
                    usages.entry(name).or_default().read = true;
                }
            }
            _ => {}
        }
        i += 1;
    }

    usages
        .into_iter()
        .filter(|(name, usage)| !usage.read && !exempt.contains(name) && !SUPERGLOBALS.contains(name))
        .filter_map(|(_, usage)| usage.first_assignment)
        .collect()
}

/// `$x = ...` with nothing between the variable and `=`, and not the target
/// of a reference assignment (`$x = &$y` keeps `$x` alive as an alias).
fn is_plain_assignment(pf: &ParsedFile, index: usize) -> bool {
    let Some(next) = pf.next_non_space(index) else {
        return false;
    };
    if !next.is("=") {
        return false;
    }
    !pf.next_non_space(next.index).is_some_and(|t| t.is("&"))
}

/// `$name` occurrences inside an interpolating string or heredoc.
fn interpolated_variables(text: &str) -> Vec<&str> {
    if text.starts_with('\'') || text.starts_with("<<<'") {
        return Vec::new();
    }
    let bytes = text.as_bytes();
    let mut names = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] >= 0x80) {
                    i += 1;
                }
                if i > start + 1 && !bytes[start + 1].is_ascii_digit() {
                    names.push(&text[start..i]);
                }
            }
            _ => i += 1,
        }
    }
    names
}
