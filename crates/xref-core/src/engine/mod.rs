//! Lint engines.
//!
//! Two variants share one contract ([`LintEngine`]):
//! - [`SimpleLintEngine`]: per-file lint plugins only.
//! - [`ProjectLintEngine`]: additionally assembles a [`ProjectDatabase`] from
//!   every file and runs project-lint plugins once it is complete.
//!
//! Both go through [`EngineCore`], which owns the per-file pipeline:
//! cache lookup, parse, plugin dispatch with fault isolation, and cache write
//! under an advisory lock.
//!
//! [`ProjectDatabase`]: crate::project::ProjectDatabase

mod project;
mod simple;

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info_span, trace, warn};

use crate::defect::{
    CodeDefect, Severity, ERROR_CODE_CANT_PARSE_FILE, ERROR_CODE_PLUGIN_FAILED,
};
use crate::error::XrefError;
use crate::file_provider::{FileProvider, FileProviderError};
use crate::parsed_file::ParsedFile;
use crate::project::FileDeclarations;
use crate::registry::PluginRegistry;
use crate::report::Report;
use crate::storage::PersistentStorage;

pub use project::ProjectLintEngine;
pub use simple::SimpleLintEngine;

/// Storage domain of cached per-file results.
pub const CACHE_DOMAIN: &str = "lint";

/// Bumped whenever [`CacheEntry`] changes shape.
const CACHE_FORMAT: &str = "2";

// ============================================================================
// Contract
// ============================================================================

/// Shared contract of the lint engines.
pub trait LintEngine {
    /// Lint every file the provider lists.
    fn get_report(&mut self, provider: &dyn FileProvider) -> Result<Report, XrefError>;

    /// Defects introduced between two revisions, restricted to `changed_files`.
    fn get_incremental_report(
        &mut self,
        old: &dyn FileProvider,
        new: &dyn FileProvider,
        changed_files: &[String],
    ) -> Result<Report, XrefError>;

    /// Counters of the last run.
    fn stats(&self) -> EngineStats;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Files handed to the pipeline (parseable, not excluded).
    pub total_files: usize,
    /// Files actually parsed (cache misses).
    pub parsed_files: usize,
    pub cache_hits: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Ignore existing cache entries and overwrite them.
    pub rewrite_cache: bool,
}

/// Fire-and-forget liveness signal, once per file.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub current: usize,
    pub total: usize,
    pub file_name: &'a str,
}

pub type ProgressCallback = Box<dyn FnMut(Progress<'_>) + Send>;

// ============================================================================
// Builder
// ============================================================================

/// Configures and builds either engine variant.
pub struct LintEngineBuilder {
    registry: Arc<PluginRegistry>,
    storage: Option<Arc<dyn PersistentStorage>>,
    options: EngineOptions,
    progress: Option<ProgressCallback>,
}

impl LintEngineBuilder {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        LintEngineBuilder {
            registry,
            storage: None,
            options: EngineOptions::default(),
            progress: None,
        }
    }

    /// Enable result caching in `storage`.
    pub fn storage(mut self, storage: Arc<dyn PersistentStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn rewrite_cache(mut self, rewrite: bool) -> Self {
        self.options.rewrite_cache = rewrite;
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn simple(self) -> SimpleLintEngine {
        SimpleLintEngine::from_core(self.into_core("simple"))
    }

    pub fn project_check(self) -> ProjectLintEngine {
        ProjectLintEngine::from_core(self.into_core("project"))
    }

    /// `project_check` selects the variant, as the `xref.project-check` setting does.
    pub fn build(self, project_check: bool) -> Box<dyn LintEngine> {
        if project_check {
            Box::new(self.project_check())
        } else {
            Box::new(self.simple())
        }
    }

    fn into_core(self, mode: &str) -> EngineCore {
        let mut hasher = Sha256::new();
        hasher.update(CACHE_FORMAT.as_bytes());
        hasher.update([0]);
        hasher.update(mode.as_bytes());
        hasher.update([0]);
        hasher.update(self.registry.fingerprint().as_bytes());
        EngineCore {
            registry: self.registry,
            storage: self.storage,
            options: self.options,
            progress: self.progress,
            stats: EngineStats::default(),
            fingerprint: hex::encode(hasher.finalize()),
        }
    }
}

// ============================================================================
// Per-file pipeline
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    file_name: String,
    defects: Vec<CodeDefect>,
    declarations: Option<FileDeclarations>,
}

/// Result of analyzing one file.
#[derive(Debug, Clone, Default)]
pub(crate) struct FileAnalysis {
    pub defects: Vec<CodeDefect>,
    /// Present when the run collects project declarations.
    pub declarations: Option<FileDeclarations>,
}

pub(crate) struct EngineCore {
    registry: Arc<PluginRegistry>,
    storage: Option<Arc<dyn PersistentStorage>>,
    options: EngineOptions,
    progress: Option<ProgressCallback>,
    stats: EngineStats,
    fingerprint: String,
}

impl EngineCore {
    pub(crate) fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub(crate) fn stats(&self) -> EngineStats {
        self.stats
    }

    pub(crate) fn reset_stats(&mut self) {
        self.stats = EngineStats::default();
    }

    /// Analyze the provider's parseable files, optionally restricted to `only`.
    ///
    /// Unreadable files are skipped with a warning; a file listed by the
    /// provider can still vanish before it is read.
    pub(crate) fn analyze_provider(
        &mut self,
        provider: &dyn FileProvider,
        only: Option<&BTreeSet<String>>,
        collect_declarations: bool,
    ) -> Result<BTreeMap<String, FileAnalysis>, XrefError> {
        let files: Vec<String> = provider
            .file_list()?
            .into_iter()
            .filter(|f| self.registry.can_parse(f))
            .filter(|f| match only {
                Some(o) => o.contains(f),
                None => true,
            })
            .collect();

        let total = files.len();
        let mut out = BTreeMap::new();
        for (i, file_name) in files.into_iter().enumerate() {
            if let Some(progress) = self.progress.as_mut() {
                progress(Progress {
                    current: i + 1,
                    total,
                    file_name: &file_name,
                });
            }

            let content = match provider.file_content(&file_name) {
                Ok(content) => content,
                Err(FileProviderError::NotFound { path }) => {
                    debug!(%path, "listed file disappeared, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "cannot read file, skipping");
                    continue;
                }
            };

            self.stats.total_files += 1;
            let analysis = self.analyze_file(&file_name, &content, collect_declarations);
            out.insert(file_name, analysis);
        }
        Ok(out)
    }

    /// Cache lookup, then parse + plugins on a miss.
    pub(crate) fn analyze_file(
        &mut self,
        file_name: &str,
        content: &[u8],
        collect_declarations: bool,
    ) -> FileAnalysis {
        let _span = info_span!("analyze", file = %file_name).entered();
        let key = self.cache_key(file_name, content);

        if !self.options.rewrite_cache {
            if let Some(entry) = self.restore(&key) {
                if !collect_declarations || entry.declarations.is_some() {
                    trace!("cache hit");
                    self.stats.cache_hits += 1;
                    return FileAnalysis {
                        defects: entry.defects,
                        declarations: entry.declarations,
                    };
                }
            }
        }

        self.stats.parsed_files += 1;
        let analysis = self.compute(file_name, content, collect_declarations);
        self.store(
            &key,
            &CacheEntry {
                file_name: file_name.to_string(),
                defects: analysis.defects.clone(),
                declarations: analysis.declarations.clone(),
            },
        );
        analysis
    }

    fn compute(&self, file_name: &str, content: &[u8], collect_declarations: bool) -> FileAnalysis {
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.registry.parse_file(file_name, content)
        }));

        let pf = match parsed {
            Ok(Ok(pf)) => pf,
            Ok(Err(e)) => {
                debug!(error = %e, "parse failed");
                return self.unparseable(file_name, e.line_number, &e.message, collect_declarations);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "parser panicked");
                return self.unparseable(file_name, 0, &message, collect_declarations);
            }
        };

        let defects = self.run_lint_plugins(&pf);
        let declarations = collect_declarations.then(|| FileDeclarations::from_parsed_file(&pf));
        // the parsed file is released here, before the next file is read
        drop(pf);

        FileAnalysis {
            defects,
            declarations,
        }
    }

    fn unparseable(
        &self,
        file_name: &str,
        line_number: u32,
        reason: &str,
        collect_declarations: bool,
    ) -> FileAnalysis {
        FileAnalysis {
            defects: vec![CodeDefect::detached(
                file_name,
                line_number,
                "",
                ERROR_CODE_CANT_PARSE_FILE,
                Severity::Fatal,
                format!("Can't parse file ({})", reason),
            )],
            declarations: collect_declarations.then(|| FileDeclarations {
                file_name: file_name.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Run every per-file lint plugin, isolating failures to one defect each.
    fn run_lint_plugins(&self, pf: &ParsedFile) -> Vec<CodeDefect> {
        let mut defects = Vec::new();
        for (plugin_id, plugin) in self.registry.lint_plugins() {
            let descriptions: BTreeMap<String, _> = plugin
                .error_map()
                .into_iter()
                .map(|d| (d.code.clone(), d))
                .collect();

            let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.report(pf)));
            let failure = match result {
                Ok(Ok(findings)) => {
                    for finding in findings {
                        match descriptions.get(finding.error_code) {
                            Some(desc) => defects.push(CodeDefect::from_token(
                                pf,
                                finding.index,
                                &desc.code,
                                desc.severity,
                                &desc.message,
                            )),
                            None => {
                                warn!(
                                    plugin = plugin_id,
                                    code = finding.error_code,
                                    "plugin reported an undeclared error code"
                                );
                                let reason = format!("undeclared error code '{}'", finding.error_code);
                                defects.push(plugin_failure(pf.file_name(), plugin_id, &reason));
                            }
                        }
                    }
                    continue;
                }
                Ok(Err(e)) => e.message,
                Err(payload) => panic_message(payload.as_ref()),
            };

            warn!(plugin = plugin_id, file = pf.file_name(), %failure, "plugin failed");
            defects.push(plugin_failure(pf.file_name(), plugin_id, &failure));
        }
        defects
    }

    // ------------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------------

    fn cache_key(&self, file_name: &str, content: &[u8]) -> String {
        let content_hash = Sha256::digest(content);
        let mut hasher = Sha256::new();
        hasher.update(file_name.as_bytes());
        hasher.update([0]);
        hasher.update(content_hash);
        hasher.update([0]);
        hasher.update(self.fingerprint.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn restore(&self, key: &str) -> Option<CacheEntry> {
        let storage = self.storage.as_ref()?;
        let data = match storage.restore_data(CACHE_DOMAIN, key) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "cache entry corrupt, treating as miss");
                None
            }
        }
    }

    fn store(&self, key: &str, entry: &CacheEntry) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        if !storage.get_lock(key) {
            debug!("cache entry locked by another run, not writing");
            return;
        }
        let result = serde_json::to_vec(entry)
            .map_err(|e| e.to_string())
            .and_then(|data| {
                storage
                    .save_data(CACHE_DOMAIN, key, &data)
                    .map_err(|e| e.to_string())
            });
        storage.release_lock(key);
        if let Err(e) = result {
            warn!(error = %e, "cache write failed");
        }
    }
}

/// Fatal defect standing in for a failed plugin.
pub(crate) fn plugin_failure(file_name: &str, plugin_id: &str, reason: &str) -> CodeDefect {
    CodeDefect::detached(
        file_name,
        0,
        plugin_id,
        ERROR_CODE_PLUGIN_FAILED,
        Severity::Fatal,
        format!("Plugin '{}' failed: {}", plugin_id, reason),
    )
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

/// Keep only files with defects.
pub(crate) fn into_report(analyses: BTreeMap<String, FileAnalysis>) -> Report {
    analyses
        .into_iter()
        .filter(|(_, a)| !a.defects.is_empty())
        .map(|(file, a)| (file, a.defects))
        .collect()
}
