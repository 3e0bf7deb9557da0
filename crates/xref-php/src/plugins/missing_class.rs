use std::collections::BTreeSet;

use xref_core::defect::{CodeDefect, Severity};
use xref_core::error::PluginError;
use xref_core::plugin::{ErrorDescription, Plugin, ProjectLintPlugin};
use xref_core::project::{ClassDeclaration, ProjectDatabase};

const CODE_MISSING_CLASS: &str = "pr01";

/// Classes, interfaces and traits shipped with PHP itself.
const BUILTIN_CLASSES: &[&str] = &[
    "ArgumentCountError", "ArithmeticError", "ArrayAccess", "ArrayIterator", "ArrayObject",
    "BackedEnum", "BadFunctionCallException", "BadMethodCallException", "Closure", "Countable",
    "DateTime", "DateTimeImmutable", "DateTimeInterface", "DivisionByZeroError", "DomainException",
    "Error", "ErrorException", "Exception", "FilterIterator", "Generator", "InvalidArgumentException",
    "Iterator", "IteratorAggregate", "IteratorIterator", "JsonException", "JsonSerializable",
    "LengthException", "LogicException", "OutOfBoundsException", "OutOfRangeException",
    "OverflowException", "RangeException", "RecursiveIterator", "RuntimeException", "Serializable",
    "SplObjectStorage", "SplObserver", "SplSubject", "Stringable", "Throwable", "Traversable",
    "TypeError", "UnderflowException", "UnexpectedValueException", "UnitEnum", "ValueError",
    "stdClass",
];

/// Parents, interfaces and traits that no file of the project declares.
#[derive(Debug)]
pub struct MissingClass {
    /// Lowercased names never reported.
    ignored: BTreeSet<String>,
}

impl MissingClass {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        MissingClass {
            ignored: ignored
                .into_iter()
                .map(|s| s.as_ref().trim_start_matches('\\').to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_known(&self, db: &ProjectDatabase, name: &str) -> bool {
        let lower = name.trim_start_matches('\\').to_ascii_lowercase();
        db.class(name).is_some()
            || self.ignored.contains(&lower)
            || BUILTIN_CLASSES.iter().any(|b| b.eq_ignore_ascii_case(&lower))
    }
}

impl Plugin for MissingClass {
    fn id(&self) -> &str {
        "php-project-missing-class"
    }

    fn name(&self) -> &str {
        "Missing parent class"
    }

    fn as_project_lint(&self) -> Option<&dyn ProjectLintPlugin> {
        Some(self)
    }
}

impl ProjectLintPlugin for MissingClass {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new(
            CODE_MISSING_CLASS,
            Severity::Error,
            "Class, interface or trait is not declared in the project",
        )]
    }

    fn project_report(&self, db: &ProjectDatabase) -> Result<Vec<CodeDefect>, PluginError> {
        let mut defects = Vec::new();
        for class in db.classes() {
            for (relation, name) in relations(class) {
                if self.is_known(db, name) {
                    continue;
                }
                defects.push(
                    CodeDefect::detached(
                        &class.file_name,
                        class.line_number,
                        name,
                        CODE_MISSING_CLASS,
                        Severity::Error,
                        format!("{} {} unknown {}", class.name, relation, name),
                    )
                    .with_context(Some(class.name.clone()), None),
                );
            }
        }
        Ok(defects)
    }
}

fn relations(class: &ClassDeclaration) -> impl Iterator<Item = (&'static str, &str)> {
    class
        .extends
        .iter()
        .map(|n| ("extends", n.as_str()))
        .chain(class.implements.iter().map(|n| ("implements", n.as_str())))
        .chain(class.uses.iter().map(|n| ("uses", n.as_str())))
}
