//! Per-file lint engine.

use std::collections::BTreeSet;

use tracing::info;

use super::{into_report, EngineCore, EngineStats, LintEngine};
use crate::error::XrefError;
use crate::file_provider::FileProvider;
use crate::report::{new_defects, Report};

/// Runs per-file lint plugins only.
pub struct SimpleLintEngine {
    core: EngineCore,
}

impl SimpleLintEngine {
    pub(crate) fn from_core(core: EngineCore) -> Self {
        SimpleLintEngine { core }
    }

    fn report_for(
        &mut self,
        provider: &dyn FileProvider,
        only: Option<&BTreeSet<String>>,
    ) -> Result<Report, XrefError> {
        let analyses = self.core.analyze_provider(provider, only, false)?;
        Ok(into_report(analyses))
    }
}

impl LintEngine for SimpleLintEngine {
    fn get_report(&mut self, provider: &dyn FileProvider) -> Result<Report, XrefError> {
        self.core.reset_stats();
        let report = self.report_for(provider, None)?;
        info!(stats = ?self.core.stats(), "lint finished");
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
        info!(stats = ?self.core.stats(), changed = only.len(), "incremental lint finished");
        Ok(new_defects(&old_report, &new_report))
    }

    fn stats(&self) -> EngineStats {
        self.core.stats()
    }
}
