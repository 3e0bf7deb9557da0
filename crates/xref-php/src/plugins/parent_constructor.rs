use xref_core::defect::{CodeDefect, Severity};
use xref_core::error::PluginError;
use xref_core::model::ClassKind;
use xref_core::plugin::{ErrorDescription, Plugin, ProjectLintPlugin};
use xref_core::project::ProjectDatabase;

const CODE_MISSED_PARENT_CONSTRUCTOR: &str = "pr02";

/// A constructor that never calls `parent::__construct()` although some
/// ancestor declares a concrete constructor.
#[derive(Debug, Default)]
pub struct ParentConstructor;

impl Plugin for ParentConstructor {
    fn id(&self) -> &str {
        "php-project-parent-constructor"
    }

    fn name(&self) -> &str {
        "Missed parent constructor call"
    }

    fn as_project_lint(&self) -> Option<&dyn ProjectLintPlugin> {
        Some(self)
    }
}

impl ProjectLintPlugin for ParentConstructor {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new(
            CODE_MISSED_PARENT_CONSTRUCTOR,
            Severity::Warning,
            "Constructor does not call the parent constructor",
        )]
    }

    fn project_report(&self, db: &ProjectDatabase) -> Result<Vec<CodeDefect>, PluginError> {
        let mut defects = Vec::new();
        for class in db.classes().filter(|c| c.kind == ClassKind::Class) {
            let Some(constructor) = class.constructor() else {
                continue;
            };
            if constructor.calls_parent_constructor {
                continue;
            }
            let parent_constructor = db.ancestors(&class.name).into_iter().find_map(|a| {
                a.constructor()
                    .filter(|c| !c.attributes.is_abstract())
                    .map(|_| a.name.as_str())
            });
            let Some(parent) = parent_constructor else {
                continue;
            };
            defects.push(
                CodeDefect::detached(
                    &class.file_name,
                    constructor.line_number,
                    &constructor.name,
                    CODE_MISSED_PARENT_CONSTRUCTOR,
                    Severity::Warning,
                    format!(
                        "{}::__construct does not call the constructor of {}",
                        class.name, parent
                    ),
                )
                .with_context(Some(class.name.clone()), Some(constructor.name.clone())),
            );
        }
        Ok(defects)
    }
}
