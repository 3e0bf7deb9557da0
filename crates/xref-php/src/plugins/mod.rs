//! Bundled plugins.
//!
//! | id | capability | codes |
//! |----|------------|-------|
//! | `php-lint-literals` | lint | `lc01` |
//! | `php-lint-static-this` | lint | `st01` |
//! | `php-lint-assignment-in-condition` | lint | `ac01` |
//! | `php-lint-closing-tag` | lint | `ct01` |
//! | `php-lint-unused-variables` | lint | `uv01` |
//! | `php-project-missing-class` | project lint | `pr01` |
//! | `php-project-parent-constructor` | project lint | `pr02` |
//! | `php-doc-declarations` | documentation | none |

mod assignment_in_condition;
mod closing_tag;
mod declaration_index;
mod literals;
mod missing_class;
mod parent_constructor;
mod static_this;
mod unused_variables;

pub use assignment_in_condition::AssignmentInCondition;
pub use closing_tag::ClosingTag;
pub use declaration_index::DeclarationIndex;
pub use literals::LowerCaseLiterals;
pub use missing_class::MissingClass;
pub use parent_constructor::ParentConstructor;
pub use static_this::StaticThis;
pub use unused_variables::UnusedVariables;
