//! Cross-file project database.
//!
//! Each file contributes a detached [`FileDeclarations`] summary (cacheable,
//! no token references). The [`ProjectDatabase`] is assembled from those
//! summaries during the first pass of a whole-project run and is read-only
//! once project-lint plugins start.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defect::{CodeDefect, Severity, ERROR_CODE_DUPLICATE_CLASS, PROJECT_FILE_NAME};
use crate::model::{Attributes, ClassKind, Function};
use crate::parsed_file::ParsedFile;

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDeclaration {
    pub name: String,
    pub line_number: u32,
    pub attributes: Attributes,
    pub parameter_count: usize,
    pub required_parameter_count: usize,
    /// Body contains `parent::__construct(...)`.
    pub calls_parent_constructor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDeclaration {
    /// Fully-qualified name as written.
    pub name: String,
    pub kind: ClassKind,
    pub file_name: String,
    pub line_number: u32,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    pub uses: Vec<String>,
    pub attributes: Attributes,
    pub methods: Vec<MethodDeclaration>,
}

impl ClassDeclaration {
    pub fn method(&self, name: &str) -> Option<&MethodDeclaration> {
        self.methods
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn constructor(&self) -> Option<&MethodDeclaration> {
        self.method("__construct")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub file_name: String,
    pub line_number: u32,
    pub parameter_count: usize,
    pub required_parameter_count: usize,
}

/// What one file contributes to the project database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeclarations {
    pub file_name: String,
    pub classes: Vec<ClassDeclaration>,
    pub functions: Vec<FunctionDeclaration>,
}

impl FileDeclarations {
    /// Extract the named classes and free functions of a parsed file.
    pub fn from_parsed_file(pf: &ParsedFile) -> Self {
        let file_name = pf.file_name().to_string();

        let classes = pf
            .classes()
            .iter()
            .filter(|c| c.name_index.is_some())
            .map(|c| ClassDeclaration {
                name: c.name.clone(),
                kind: c.kind,
                file_name: file_name.clone(),
                line_number: pf.line_number_at(c.index),
                extends: c.extends.clone(),
                implements: c.implements.clone(),
                uses: c.uses.clone(),
                attributes: c.attributes,
                methods: pf
                    .methods_of(c)
                    .filter_map(|m| method_declaration(pf, m))
                    .collect(),
            })
            .collect();

        let functions = pf
            .functions()
            .iter()
            .filter(|f| f.class_id.is_none())
            .filter_map(|f| {
                Some(FunctionDeclaration {
                    name: f.name.clone()?,
                    file_name: file_name.clone(),
                    line_number: pf.line_number_at(f.index),
                    parameter_count: f.parameters.len(),
                    required_parameter_count: required_parameters(f),
                })
            })
            .collect();

        FileDeclarations {
            file_name,
            classes,
            functions,
        }
    }
}

fn method_declaration(pf: &ParsedFile, m: &Function) -> Option<MethodDeclaration> {
    Some(MethodDeclaration {
        name: m.name.clone()?,
        line_number: pf.line_number_at(m.index),
        attributes: m.attributes,
        parameter_count: m.parameters.len(),
        required_parameter_count: required_parameters(m),
        calls_parent_constructor: calls_parent_constructor(pf, m),
    })
}

fn required_parameters(f: &Function) -> usize {
    f.parameters
        .iter()
        .filter(|p| !p.has_default_value && !p.is_variadic)
        .count()
}

fn calls_parent_constructor(pf: &ParsedFile, m: &Function) -> bool {
    let Some(start) = m.body_starts else {
        return false;
    };
    (start..m.body_ends).any(|i| {
        let Some(token) = pf.token_at(i) else {
            return false;
        };
        if !token.is_word("parent") {
            return false;
        }
        let Some(op) = pf.next_non_space(i) else {
            return false;
        };
        op.is("::")
            && pf
                .next_non_space(op.index)
                .is_some_and(|t| t.text.eq_ignore_ascii_case("__construct"))
    })
}

// ============================================================================
// Database
// ============================================================================

/// Classes and functions of the whole project, keyed by lowercased
/// fully-qualified name. The first declaration of a name wins.
#[derive(Debug, Clone, Default)]
pub struct ProjectDatabase {
    classes: BTreeMap<String, ClassDeclaration>,
    functions: BTreeMap<String, FunctionDeclaration>,
    files: Vec<String>,
}

impl ProjectDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one file's declarations. Returns project-level defects for
    /// classes that were already declared elsewhere.
    pub fn add_file(&mut self, declarations: FileDeclarations) -> Vec<CodeDefect> {
        let mut defects = Vec::new();
        self.files.push(declarations.file_name.clone());

        for class in declarations.classes {
            let key = class.name.to_ascii_lowercase();
            match self.classes.get(&key) {
                Some(first) => {
                    debug!(class = %class.name, "duplicate class declaration");
                    defects.push(CodeDefect::detached(
                        PROJECT_FILE_NAME,
                        0,
                        class.name.clone(),
                        ERROR_CODE_DUPLICATE_CLASS,
                        Severity::Error,
                        format!(
                            "{} {} is declared in {}:{} and {}:{}",
                            capitalize(class.kind.as_str()),
                            class.name,
                            first.file_name,
                            first.line_number,
                            class.file_name,
                            class.line_number
                        ),
                    ));
                }
                None => {
                    self.classes.insert(key, class);
                }
            }
        }

        for function in declarations.functions {
            self.functions
                .entry(function.name.to_ascii_lowercase())
                .or_insert(function);
        }

        defects
    }

    /// Look up a class, interface or trait by fully-qualified name
    /// (case-insensitive, leading separator ignored).
    pub fn class(&self, name: &str) -> Option<&ClassDeclaration> {
        self.classes
            .get(&name.trim_start_matches('\\').to_ascii_lowercase())
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.functions
            .get(&name.trim_start_matches('\\').to_ascii_lowercase())
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDeclaration> {
        self.classes.values()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        self.functions.values()
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Ancestors of a class through `extends`, nearest first. Stops at unknown
    /// classes and at cycles.
    pub fn ancestors(&self, name: &str) -> Vec<&ClassDeclaration> {
        let mut out: Vec<&ClassDeclaration> = Vec::new();
        let mut current = self.class(name);
        while let Some(class) = current {
            let Some(parent_name) = class.extends.first() else {
                break;
            };
            let Some(parent) = self.class(parent_name) else {
                break;
            };
            if out.iter().any(|c| c.name.eq_ignore_ascii_case(&parent.name))
                || parent.name.eq_ignore_ascii_case(name)
            {
                break;
            }
            out.push(parent);
            current = Some(parent);
        }
        out
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
