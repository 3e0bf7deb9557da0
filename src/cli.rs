//! Command implementations shared by the `xref` binary and the tests.
//!
//! Each `run_*` function takes resolved configuration and returns data; the
//! binary decides how to print it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use xref_core::doc::{generate_documentation, write_documentation};
use xref_core::engine::{EngineStats, LintEngine, LintEngineBuilder};
use xref_core::error::XrefError;
use xref_core::file_provider::{FileProvider, FileSystemProvider};
use xref_core::registry::PluginRegistry;
use xref_core::report::{sort_and_filter_report, Report, ReportFilter};
use xref_core::scm::{GitSourceCodeManager, Revision, RevisionSpec, SourceCodeManager};
use xref_core::storage::{FileStorage, MemoryStorage, PersistentStorage};
use xref_php::{register_defaults, PhpOptions};

use crate::config::{
    default_config_text, LoadedConfig, Settings, SourceCodeManagerKind, StorageManager, CONFIG_DIR,
    CONFIG_FILE_NAME,
};

// ============================================================================
// Shared setup
// ============================================================================

/// Registry with the PHP parser and every bundled plugin.
pub fn build_registry(settings: &Settings) -> Result<Arc<PluginRegistry>, XrefError> {
    let mut registry = PluginRegistry::new();
    let options = PhpOptions {
        ignore_missing_class: settings.ignore_missing_class.clone(),
    };
    register_defaults(&mut registry, &options)?;
    Ok(Arc::new(registry))
}

/// Cache backend chosen by `xref.storage-manager`; `None` disables caching.
pub fn open_storage(config: &LoadedConfig) -> Option<Arc<dyn PersistentStorage>> {
    match config.settings.storage_manager {
        StorageManager::File => Some(Arc::new(FileStorage::new(config.data_dir()))),
        StorageManager::Memory => Some(Arc::new(MemoryStorage::new())),
        StorageManager::None => None,
    }
}

fn source_code_manager(config: &LoadedConfig) -> GitSourceCodeManager {
    match config.settings.source_code_manager {
        SourceCodeManagerKind::Git => GitSourceCodeManager::new(config.git_repository_dir())
            .with_timeout(Duration::from_secs(config.settings.git_command_timeout_secs)),
    }
}

fn engine(
    config: &LoadedConfig,
    registry: Arc<PluginRegistry>,
    use_cache: bool,
    rewrite_cache: bool,
) -> Box<dyn LintEngine> {
    let mut builder = LintEngineBuilder::new(registry).rewrite_cache(rewrite_cache);
    if use_cache {
        if let Some(storage) = open_storage(config) {
            builder = builder.storage(storage);
        }
    }
    builder.build(config.settings.project_check)
}

// ============================================================================
// lint
// ============================================================================

/// Which files a lint run looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintTarget {
    /// Files on disk under these paths (project root when empty, after
    /// falling back to `project.source-code-dir`).
    Paths(Vec<PathBuf>),
    /// New defects in modified files: `HEAD` against the working tree.
    GitWorkingTree,
    /// New defects in modified files: `HEAD` against the index.
    GitCached,
    /// `--git-rev`: one revision, or new defects between two.
    GitRevision(RevisionSpec),
}

#[derive(Debug, Clone)]
pub struct LintOptions {
    pub target: LintTarget,
    pub use_cache: bool,
}

#[derive(Debug, Clone)]
pub struct LintOutcome {
    /// Sorted and filtered by report level and ignored codes.
    pub report: Report,
    pub stats: EngineStats,
}

pub fn run_lint(config: &LoadedConfig, options: &LintOptions) -> Result<LintOutcome, XrefError> {
    let registry = build_registry(&config.settings)?;
    let mut engine = engine(config, registry, options.use_cache, false);
    let exclude = &config.settings.exclude_paths;

    let report = match &options.target {
        LintTarget::Paths(paths) => {
            let mut provider = FileSystemProvider::with_paths(&config.root, lint_paths(config, paths));
            provider.exclude_paths(exclude)?;
            engine.get_report(&provider)?
        }
        LintTarget::GitWorkingTree => incremental(
            &mut *engine,
            &source_code_manager(config),
            &Revision::Head,
            &Revision::WorkingTree,
            exclude,
        )?,
        LintTarget::GitCached => incremental(
            &mut *engine,
            &source_code_manager(config),
            &Revision::Head,
            &Revision::Index,
            exclude,
        )?,
        LintTarget::GitRevision(RevisionSpec::Single(revision)) => {
            let mut provider = source_code_manager(config).file_provider(revision)?;
            provider.exclude_paths(exclude)?;
            engine.get_report(provider.as_ref())?
        }
        LintTarget::GitRevision(RevisionSpec::Range(from, to)) => incremental(
            &mut *engine,
            &source_code_manager(config),
            from,
            to,
            exclude,
        )?,
    };

    let filter = ReportFilter::new(config.settings.report_level).ignore(&config.settings.ignore_errors);
    Ok(LintOutcome {
        report: sort_and_filter_report(report, &filter),
        stats: engine.stats(),
    })
}

/// Command-line paths, else `project.source-code-dir`, else the whole root.
fn lint_paths(config: &LoadedConfig, paths: &[PathBuf]) -> Vec<PathBuf> {
    if !paths.is_empty() {
        return paths.to_vec();
    }
    config
        .settings
        .source_code_dirs
        .iter()
        .map(|dir| config.resolve(dir))
        .collect()
}

fn incremental(
    engine: &mut dyn LintEngine,
    scm: &dyn SourceCodeManager,
    from: &Revision,
    to: &Revision,
    exclude: &[String],
) -> Result<Report, XrefError> {
    let mut old = scm.file_provider(from)?;
    let mut new = scm.file_provider(to)?;
    old.exclude_paths(exclude)?;
    new.exclude_paths(exclude)?;
    let changed = scm.list_of_modified_files(from, to)?;
    info!(%from, %to, changed = changed.len(), "incremental lint");
    engine.get_incremental_report(old.as_ref(), new.as_ref(), &changed)
}

// ============================================================================
// init
// ============================================================================

#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub config_file: PathBuf,
    /// False when an existing project file was kept.
    pub created: bool,
    pub stats: EngineStats,
}

/// Create `.xref/xref.toml` under `root` unless present, then warm the cache
/// with a full project-check run.
pub fn run_init(root: &Path, load: impl FnOnce() -> Result<LoadedConfig, XrefError>) -> Result<InitOutcome, XrefError> {
    let config_dir = root.join(CONFIG_DIR);
    let config_file = config_dir.join(CONFIG_FILE_NAME);
    let created = !config_file.exists();
    if created {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        fs::create_dir_all(&config_dir)
            .and_then(|_| fs::write(&config_file, default_config_text(&name)))
            .map_err(|e| XrefError::internal(format!("cannot write {}: {}", config_file.display(), e)))?;
        info!(path = %config_file.display(), "created config file");
    } else {
        warn!(path = %config_file.display(), "config file exists, keeping it");
    }

    let config = load()?;
    let registry = build_registry(&config.settings)?;
    let mut builder = LintEngineBuilder::new(registry).rewrite_cache(true);
    if let Some(storage) = open_storage(&config) {
        builder = builder.storage(storage);
    }
    let mut engine = builder.project_check();

    let mut provider = FileSystemProvider::with_paths(&config.root, lint_paths(&config, &[]));
    provider.exclude_paths(&config.settings.exclude_paths)?;
    engine.get_report(&provider)?;
    debug!(stats = ?engine.stats(), "cache initialized");

    Ok(InitOutcome {
        config_file,
        created,
        stats: engine.stats(),
    })
}

// ============================================================================
// doc
// ============================================================================

#[derive(Debug, Clone)]
pub struct DocOutcome {
    pub output_dir: PathBuf,
    pub written: Vec<PathBuf>,
    /// Files that failed to parse and plugin failures.
    pub problems: Report,
}

/// Run the documentation plugins over the project and write their pages.
pub fn run_doc(config: &LoadedConfig, output_dir: Option<&Path>) -> Result<DocOutcome, XrefError> {
    let registry = build_registry(&config.settings)?;
    let mut provider = FileSystemProvider::with_paths(&config.root, lint_paths(config, &[]));
    provider.exclude_paths(&config.settings.exclude_paths)?;

    let output = generate_documentation(&registry, &provider)?;
    let output_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.data_dir().join("doc"));
    let written = write_documentation(&output, &output_dir, "json")
        .map_err(|e| XrefError::internal(format!("cannot write documentation: {}", e)))?;

    let mut problems = Report::new();
    for defect in output.problems {
        problems.entry(defect.file_name.clone()).or_default().push(defect);
    }
    Ok(DocOutcome {
        output_dir,
        written,
        problems,
    })
}
