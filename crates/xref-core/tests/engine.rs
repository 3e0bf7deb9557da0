//! Lint engine behavior against a toy word-level language.
//!
//! The parser here turns every whitespace-separated word into a `Name` token,
//! which is enough to drive the per-file pipeline, caching, fault isolation
//! and incremental reports without a real language front end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use xref_core::defect::{
    CodeDefect, Severity, ERROR_CODE_CANT_PARSE_FILE, ERROR_CODE_PLUGIN_FAILED, PROJECT_FILE_NAME,
};
use xref_core::engine::{LintEngine, LintEngineBuilder, Progress};
use xref_core::error::{ParseError, PluginError};
use xref_core::file_provider::InMemoryFileProvider;
use xref_core::parsed_file::{FileModel, ParsedFile};
use xref_core::plugin::{ErrorDescription, FileParser, Finding, LintPlugin, Plugin, ProjectLintPlugin};
use xref_core::project::ProjectDatabase;
use xref_core::registry::PluginRegistry;
use xref_core::storage::{MemoryStorage, PersistentStorage, StorageError, StorageResult};
use xref_core::token::{Token, TokenKind};

// ============================================================================
// Fixtures
// ============================================================================

struct WordParser;

impl FileParser for WordParser {
    fn supported_extensions(&self) -> Vec<String> {
        vec!["txt".to_string()]
    }

    fn parse(&self, content: &[u8], file_name: &str) -> Result<ParsedFile, ParseError> {
        let text = std::str::from_utf8(content).map_err(|e| ParseError::new(e.to_string(), 0))?;
        let mut tokens = Vec::new();
        for (line, words) in text.lines().enumerate() {
            for word in words.split_whitespace() {
                if word == "!!" {
                    return Err(ParseError::new("stray '!!'", line as u32 + 1));
                }
                let index = tokens.len();
                tokens.push(Token::new(TokenKind::Name, word, line as u32 + 1, index));
            }
        }
        Ok(ParsedFile::new(file_name, tokens, FileModel::default()))
    }
}

/// Flags every `TODO` word.
struct TodoPlugin;

impl Plugin for TodoPlugin {
    fn id(&self) -> &str {
        "todo"
    }

    fn name(&self) -> &str {
        "TODO words"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for TodoPlugin {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new("td01", Severity::Warning, "Unfinished work")]
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        Ok(pf
            .tokens()
            .iter()
            .filter(|t| t.text == "TODO")
            .map(|t| Finding::new(t.index, "td01"))
            .collect())
    }
}

/// Panics on `boom`, errors on `fail`, otherwise reports nothing.
struct FragilePlugin;

impl Plugin for FragilePlugin {
    fn id(&self) -> &str {
        "fragile"
    }

    fn name(&self) -> &str {
        "Fragile"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for FragilePlugin {
    fn error_map(&self) -> Vec<ErrorDescription> {
        Vec::new()
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        if pf.tokens().iter().any(|t| t.text == "boom") {
            panic!("boom");
        }
        if pf.tokens().iter().any(|t| t.text == "fail") {
            return Err(PluginError::new("fragile", "refused"));
        }
        Ok(Vec::new())
    }
}

/// Reports `XXX` words under a code its error map never declares.
struct UndeclaredCodePlugin;

impl Plugin for UndeclaredCodePlugin {
    fn id(&self) -> &str {
        "undeclared"
    }

    fn name(&self) -> &str {
        "Undeclared code"
    }

    fn as_lint(&self) -> Option<&dyn LintPlugin> {
        Some(self)
    }
}

impl LintPlugin for UndeclaredCodePlugin {
    fn error_map(&self) -> Vec<ErrorDescription> {
        vec![ErrorDescription::new("ud01", Severity::Notice, "Declared code")]
    }

    fn report<'a>(&'a self, pf: &ParsedFile) -> Result<Vec<Finding<'a>>, PluginError> {
        Ok(pf
            .tokens()
            .iter()
            .filter(|t| t.text == "XXX")
            .map(|t| Finding::new(t.index, "ud99"))
            .collect())
    }
}

/// Project plugin that panics with a formatted message.
struct PanickingProjectPlugin;

impl Plugin for PanickingProjectPlugin {
    fn id(&self) -> &str {
        "project-panic"
    }

    fn name(&self) -> &str {
        "Panicking project plugin"
    }

    fn as_project_lint(&self) -> Option<&dyn ProjectLintPlugin> {
        Some(self)
    }
}

impl ProjectLintPlugin for PanickingProjectPlugin {
    fn error_map(&self) -> Vec<ErrorDescription> {
        Vec::new()
    }

    fn project_report(&self, db: &ProjectDatabase) -> Result<Vec<CodeDefect>, PluginError> {
        panic!("index out of range after {} classes", db.classes().count());
    }
}

fn registry_with(extra: &[Arc<dyn Plugin>]) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register_parser(Arc::new(WordParser)).unwrap();
    registry.register_plugin(Arc::new(TodoPlugin)).unwrap();
    registry.register_plugin(Arc::new(FragilePlugin)).unwrap();
    for plugin in extra {
        registry.register_plugin(plugin.clone()).unwrap();
    }
    Arc::new(registry)
}

fn registry() -> Arc<PluginRegistry> {
    registry_with(&[])
}

/// Storage that never grants a lock and counts write attempts.
#[derive(Default)]
struct LockedStorage {
    inner: MemoryStorage,
    saves: AtomicUsize,
}

impl PersistentStorage for LockedStorage {
    fn save_data(&self, domain: &str, key: &str, data: &[u8]) -> StorageResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_data(domain, key, data)
    }

    fn restore_data(&self, domain: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.restore_data(domain, key)
    }

    fn get_lock(&self, _key: &str) -> bool {
        false
    }

    fn release_lock(&self, _key: &str) {}
}

/// Storage whose reads always fail.
struct BrokenStorage;

impl PersistentStorage for BrokenStorage {
    fn save_data(&self, _domain: &str, _key: &str, _data: &[u8]) -> StorageResult<()> {
        Ok(())
    }

    fn restore_data(&self, domain: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Err(StorageError::Io {
            path: format!("{}/{}", domain, key).into(),
            source: std::io::Error::other("disk on fire"),
        })
    }

    fn get_lock(&self, _key: &str) -> bool {
        true
    }

    fn release_lock(&self, _key: &str) {}
}

fn project() -> InMemoryFileProvider {
    InMemoryFileProvider::new()
        .with_file("a.txt", "one TODO\ntwo\nTODO three")
        .with_file("b.txt", "clean words only")
        .with_file("notes.md", "TODO ignored: no parser")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn report_lists_defects_per_file() {
    let mut engine = LintEngineBuilder::new(registry()).simple();
    let report = engine.get_report(&project()).unwrap();

    assert_eq!(report.keys().collect::<Vec<_>>(), vec!["a.txt"]);
    let lines: Vec<u32> = report["a.txt"].iter().map(|d| d.line_number).collect();
    assert_eq!(lines, vec![1, 3]);
    assert_eq!(report["a.txt"][0].error_code, "td01");
    assert_eq!(report["a.txt"][0].severity, Severity::Warning);
    assert_eq!(engine.stats().total_files, 2);
}

#[test]
fn parse_failure_is_one_fatal_defect() {
    let provider = InMemoryFileProvider::new().with_file("bad.txt", "fine\nnot !! fine");
    let mut engine = LintEngineBuilder::new(registry()).simple();
    let report = engine.get_report(&provider).unwrap();

    let defects = &report["bad.txt"];
    assert_eq!(defects.len(), 1);
    assert_eq!(defects[0].error_code, ERROR_CODE_CANT_PARSE_FILE);
    assert_eq!(defects[0].severity, Severity::Fatal);
    assert_eq!(defects[0].line_number, 2);
}

#[test]
fn plugin_panic_and_error_are_isolated() {
    let provider = InMemoryFileProvider::new()
        .with_file("a.txt", "boom TODO")
        .with_file("b.txt", "fail")
        .with_file("c.txt", "TODO");
    let mut engine = LintEngineBuilder::new(registry()).simple();
    let report = engine.get_report(&provider).unwrap();

    let codes = |file: &str| -> Vec<String> {
        report[file].iter().map(|d| d.error_code.clone()).collect()
    };
    // the healthy plugin still ran on the file that made the other one panic
    assert_eq!(codes("a.txt"), vec!["td01", ERROR_CODE_PLUGIN_FAILED]);
    assert_eq!(codes("b.txt"), vec![ERROR_CODE_PLUGIN_FAILED]);
    assert_eq!(codes("c.txt"), vec!["td01"]);
    assert!(report["a.txt"][1].message.contains("fragile"));
}

#[test]
fn undeclared_error_code_is_a_plugin_failure() {
    let provider = InMemoryFileProvider::new().with_file("a.txt", "XXX TODO");
    let mut engine = LintEngineBuilder::new(registry_with(&[Arc::new(UndeclaredCodePlugin)])).simple();
    let report = engine.get_report(&provider).unwrap();

    let defects = &report["a.txt"];
    let failure = defects
        .iter()
        .find(|d| d.error_code == ERROR_CODE_PLUGIN_FAILED)
        .unwrap();
    assert_eq!(failure.severity, Severity::Fatal);
    assert!(failure.message.contains("undeclared"));
    assert!(failure.message.contains("ud99"));
    assert!(defects.iter().all(|d| d.error_code != "ud99"));
    assert!(defects.iter().any(|d| d.error_code == "td01"));
}

#[test]
fn project_plugin_panic_keeps_its_message() {
    let mut engine =
        LintEngineBuilder::new(registry_with(&[Arc::new(PanickingProjectPlugin)])).project_check();
    let report = engine.get_report(&project()).unwrap();

    let failures = &report[PROJECT_FILE_NAME];
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error_code, ERROR_CODE_PLUGIN_FAILED);
    assert!(failures[0].message.contains("project-panic"));
    assert!(failures[0].message.contains("panic: index out of range after"));
    // per-file defects survive the failed project pass
    assert_eq!(report["a.txt"].len(), 2);
}

#[test]
fn cached_run_is_identical_and_parses_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = project();

    let mut first = LintEngineBuilder::new(registry()).storage(storage.clone()).simple();
    let cold = first.get_report(&provider).unwrap();
    assert_eq!(first.stats().parsed_files, 2);
    assert!(!storage.is_empty());

    let mut second = LintEngineBuilder::new(registry()).storage(storage.clone()).simple();
    let warm = second.get_report(&provider).unwrap();
    assert_eq!(warm, cold);
    assert_eq!(second.stats().parsed_files, 0);
    assert_eq!(second.stats().cache_hits, 2);

    let mut rewrite = LintEngineBuilder::new(registry())
        .storage(storage)
        .rewrite_cache(true)
        .simple();
    assert_eq!(rewrite.get_report(&provider).unwrap(), cold);
    assert_eq!(rewrite.stats().parsed_files, 2);
}

#[test]
fn changed_content_misses_the_cache() {
    let storage = Arc::new(MemoryStorage::new());
    let mut engine = LintEngineBuilder::new(registry()).storage(storage).simple();
    engine.get_report(&project()).unwrap();

    let mut edited = project();
    edited.insert("b.txt", "now with TODO");
    let report = engine.get_report(&edited).unwrap();
    assert_eq!(engine.stats().parsed_files, 1);
    assert_eq!(engine.stats().cache_hits, 1);
    assert_eq!(report["b.txt"].len(), 1);
}

#[test]
fn lock_not_acquired_means_no_write() {
    let storage = Arc::new(LockedStorage::default());
    let mut engine = LintEngineBuilder::new(registry()).storage(storage.clone()).simple();
    let report = engine.get_report(&project()).unwrap();
    assert_eq!(report["a.txt"].len(), 2);
    assert_eq!(storage.saves.load(Ordering::SeqCst), 0);
}

#[test]
fn storage_failure_is_a_cache_miss() {
    let mut engine = LintEngineBuilder::new(registry())
        .storage(Arc::new(BrokenStorage))
        .simple();
    let report = engine.get_report(&project()).unwrap();
    assert_eq!(report["a.txt"].len(), 2);
    assert_eq!(engine.stats().parsed_files, 2);
}

#[test]
fn progress_is_reported_once_per_file() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let mut engine = LintEngineBuilder::new(registry())
        .progress(Box::new(move |p: Progress<'_>| {
            assert!(p.current <= p.total);
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .simple();
    engine.get_report(&project()).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

mod incremental {
    use super::*;

    #[test]
    fn same_revision_reports_nothing() {
        let provider = project();
        let all = vec!["a.txt".to_string(), "b.txt".to_string()];
        let mut engine = LintEngineBuilder::new(registry()).simple();
        let report = engine
            .get_incremental_report(&provider, &provider, &all)
            .unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn only_new_defects_in_changed_files() {
        let old = project();
        let mut new = project();
        // a.txt: existing TODOs move down a line, one more is added
        new.insert("a.txt", "\none TODO\ntwo TODO\nTODO three");
        // b.txt gains one, but is not listed as changed
        new.insert("b.txt", "TODO");

        let mut engine = LintEngineBuilder::new(registry()).simple();
        let report = engine
            .get_incremental_report(&old, &new, &["a.txt".to_string()])
            .unwrap();

        assert_eq!(report.keys().collect::<Vec<_>>(), vec!["a.txt"]);
        assert_eq!(report["a.txt"].len(), 1);
    }

    #[test]
    fn new_file_contributes_every_defect() {
        let old = project();
        let new = project().with_file("c.txt", "TODO TODO");
        let mut engine = LintEngineBuilder::new(registry()).simple();
        let report = engine
            .get_incremental_report(&old, &new, &["c.txt".to_string()])
            .unwrap();
        assert_eq!(report["c.txt"].len(), 2);
    }

    #[test]
    fn deleted_file_contributes_nothing() {
        let old = project();
        let mut new = project();
        new.remove("a.txt");
        let changed = vec!["a.txt".to_string()];

        let mut simple = LintEngineBuilder::new(registry()).simple();
        let report = simple.get_incremental_report(&old, &new, &changed).unwrap();
        assert!(report.is_empty(), "{:?}", report);
        assert_eq!(simple.stats().total_files, 1);

        let mut project_check = LintEngineBuilder::new(registry()).project_check();
        let report = project_check
            .get_incremental_report(&old, &new, &changed)
            .unwrap();
        assert!(report.is_empty(), "{:?}", report);
    }
}
