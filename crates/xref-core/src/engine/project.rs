//! Whole-project lint engine.
//!
//! First pass: every parseable file goes through the per-file pipeline, which
//! also yields its declarations; the declarations are merged into a
//! [`ProjectDatabase`]. Once every file is merged (the barrier), project-lint
//! plugins run exactly once over the finished database.
//!
//! Incremental runs still build the database from every file of each
//! revision, since a changed file can only be judged against the whole
//! project, but report only the changed files plus the project pseudo-file.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use super::{panic_message, plugin_failure, EngineCore, EngineStats, LintEngine};
use crate::defect::{CodeDefect, PROJECT_FILE_NAME};
use crate::error::XrefError;
use crate::file_provider::FileProvider;
use crate::project::{FileDeclarations, ProjectDatabase};
use crate::report::{new_defects, Report};

/// Runs per-file plugins plus project-lint plugins over a project database.
pub struct ProjectLintEngine {
    core: EngineCore,
}

impl ProjectLintEngine {
    pub(crate) fn from_core(core: EngineCore) -> Self {
        ProjectLintEngine { core }
    }

    fn report_for(
        &mut self,
        provider: &dyn FileProvider,
        only: Option<&BTreeSet<String>>,
    ) -> Result<Report, XrefError> {
        let keep = |file: &str| match only {
            Some(o) => file == PROJECT_FILE_NAME || o.contains(file),
            None => true,
        };

        let analyses = self.core.analyze_provider(provider, None, true)?;

        let mut db = ProjectDatabase::new();
        let mut report = Report::new();
        let mut project_defects: Vec<CodeDefect> = Vec::new();
        for (file_name, analysis) in analyses {
            let declarations = analysis.declarations.unwrap_or_else(|| FileDeclarations {
                file_name: file_name.clone(),
                ..Default::default()
            });
            project_defects.extend(db.add_file(declarations));
            if keep(&file_name) && !analysis.defects.is_empty() {
                report.insert(file_name, analysis.defects);
            }
        }
        debug!(
            classes = db.classes().count(),
            functions = db.functions().count(),
            "project database complete"
        );

        for (plugin_id, plugin) in self.core.registry().project_lint_plugins() {
            match panic::catch_unwind(AssertUnwindSafe(|| plugin.project_report(&db))) {
                Ok(Ok(defects)) => project_defects.extend(defects),
                Ok(Err(e)) => {
                    warn!(plugin = plugin_id, error = %e, "project plugin failed");
                    project_defects.push(plugin_failure(PROJECT_FILE_NAME, plugin_id, &e.message));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(plugin = plugin_id, %message, "project plugin panicked");
                    project_defects.push(plugin_failure(PROJECT_FILE_NAME, plugin_id, &message));
                }
            }
        }

        for defect in project_defects {
            if keep(&defect.file_name) {
                report.entry(defect.file_name.clone()).or_default().push(defect);
            }
        }
        Ok(report)
    }
}

impl LintEngine for ProjectLintEngine {
    fn get_report(&mut self, provider: &dyn FileProvider) -> Result<Report, XrefError> {
        self.core.reset_stats();
        let report = self.report_for(provider, None)?;
        info!(stats = ?self.core.stats(), "project lint finished");
        Ok(report)
    }

    fn get_incremental_report(
        &mut self,
        old: &dyn FileProvider,
        new: &dyn FileProvider,
        changed_files: &[String],
    ) -> Result<Report, XrefError> {
        self.core.reset_stats();
        let only: BTreeSet<String> = changed_files.iter().cloned().collect();
        let old_report = self.report_for(old, Some(&only))?;
        let new_report = self.report_for(new, Some(&only))?;
        info!(stats = ?self.core.stats(), changed = only.len(), "incremental project lint finished");
        Ok(new_defects(&old_report, &new_report))
    }

    fn stats(&self) -> EngineStats {
        self.core.stats()
    }
}
