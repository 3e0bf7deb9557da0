//! File providers: where the engines get file names and content from.
//!
//! A provider is bound to one location or revision. Exclusions are applied
//! inside the provider, so excluded paths never reach an engine.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::scm::ScmError;

/// Directories never descended into when walking a tree.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[".git", ".hg", ".svn", ".xref", "node_modules"];

#[derive(Debug, Error)]
pub enum FileProviderError {
    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error(transparent)]
    Scm(#[from] ScmError),
}

pub type FileProviderResult<T> = Result<T, FileProviderError>;

/// Enumerates and reads the files of one location or revision.
pub trait FileProvider {
    /// Relative, forward-slash paths, sorted, exclusions applied.
    fn file_list(&self) -> FileProviderResult<Vec<String>>;

    fn file_content(&self, path: &str) -> FileProviderResult<Vec<u8>>;

    /// Add exclusion patterns. A pattern with glob metacharacters is a glob
    /// matched against the relative path; anything else is a path prefix.
    fn exclude_paths(&mut self, patterns: &[String]) -> FileProviderResult<()>;
}

// ============================================================================
// Path Filter
// ============================================================================

/// Exclusion set shared by all providers.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    prefixes: Vec<String>,
    patterns: Vec<String>,
    globs: Option<GlobSet>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, patterns: &[String]) -> FileProviderResult<()> {
        for raw in patterns {
            let pattern = raw.trim().replace('\\', "/");
            if pattern.is_empty() {
                continue;
            }
            if pattern.contains(['*', '?', '[', '{']) {
                self.patterns.push(pattern);
            } else {
                self.prefixes
                    .push(pattern.trim_start_matches("./").trim_end_matches('/').to_string());
            }
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &self.patterns {
            let glob = Glob::new(pattern).map_err(|e| FileProviderError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| FileProviderError::InvalidPattern {
                pattern: self.patterns.join(", "),
                reason: e.to_string(),
            })?;
        self.globs = Some(set);
        Ok(())
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let by_prefix = self.prefixes.iter().any(|prefix| {
            path == prefix
                || (path.starts_with(prefix.as_str())
                    && path.as_bytes().get(prefix.len()) == Some(&b'/'))
        });
        by_prefix || self.globs.as_ref().is_some_and(|g| g.is_match(path))
    }
}

// ============================================================================
// File System Provider
// ============================================================================

/// Files under a root directory, optionally restricted to some sub-paths.
#[derive(Debug, Clone)]
pub struct FileSystemProvider {
    root: PathBuf,
    paths: Vec<PathBuf>,
    filter: PathFilter,
}

impl FileSystemProvider {
    /// Every file under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSystemProvider {
            root: root.into(),
            paths: Vec::new(),
            filter: PathFilter::new(),
        }
    }

    /// Only files at or under `paths` (relative to `root` or absolute).
    pub fn with_paths(root: impl Into<PathBuf>, paths: Vec<PathBuf>) -> Self {
        FileSystemProvider {
            root: root.into(),
            paths,
            filter: PathFilter::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let text = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Some(text)
    }
}

fn should_exclude(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| DEFAULT_EXCLUDE_DIRS.contains(&name))
}

impl FileProvider for FileSystemProvider {
    fn file_list(&self) -> FileProviderResult<Vec<String>> {
        let starts: Vec<PathBuf> = if self.paths.is_empty() {
            vec![self.root.clone()]
        } else {
            self.paths
                .iter()
                .map(|p| if p.is_absolute() { p.clone() } else { self.root.join(p) })
                .collect()
        };

        let mut files = Vec::new();
        for start in starts {
            if !start.exists() {
                return Err(FileProviderError::NotFound {
                    path: start.display().to_string(),
                });
            }
            for entry in WalkDir::new(&start)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !should_exclude(e))
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(rel) = self.relative(entry.path()) else {
                    continue;
                };
                if self.filter.is_excluded(&rel) {
                    continue;
                }
                files.push(rel);
            }
        }

        files.sort();
        files.dedup();
        debug!(root = %self.root.display(), count = files.len(), "listed files");
        Ok(files)
    }

    fn file_content(&self, path: &str) -> FileProviderResult<Vec<u8>> {
        let full = self.root.join(path);
        fs::read(&full).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                FileProviderError::NotFound {
                    path: path.to_string(),
                }
            } else {
                FileProviderError::Io {
                    path: path.to_string(),
                    source,
                }
            }
        })
    }

    fn exclude_paths(&mut self, patterns: &[String]) -> FileProviderResult<()> {
        self.filter.add(patterns)
    }
}

// ============================================================================
// In-Memory Provider
// ============================================================================

/// A fixed set of files held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileProvider {
    files: BTreeMap<String, Vec<u8>>,
    filter: PathFilter,
}

impl InMemoryFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn remove(&mut self, path: &str) {
        self.files.remove(path);
    }
}

impl FileProvider for InMemoryFileProvider {
    fn file_list(&self) -> FileProviderResult<Vec<String>> {
        Ok(self
            .files
            .keys()
            .filter(|p| !self.filter.is_excluded(p))
            .cloned()
            .collect())
    }

    fn file_content(&self, path: &str) -> FileProviderResult<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FileProviderError::NotFound {
                path: path.to_string(),
            })
    }

    fn exclude_paths(&mut self, patterns: &[String]) -> FileProviderResult<()> {
        self.filter.add(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefix_and_glob_exclusions() {
        let mut f = PathFilter::new();
        f.add(&strings(&["vendor/", "lib/*.inc", "./tmp"])).unwrap();
        assert!(f.is_excluded("vendor/a.php"));
        assert!(f.is_excluded("tmp"));
        assert!(!f.is_excluded("vendorized/a.php"));
        assert!(f.is_excluded("lib/x.inc"));
        assert!(!f.is_excluded("lib/x.php"));
    }

    #[test]
    fn invalid_glob_is_reported() {
        let mut f = PathFilter::new();
        let err = f.add(&strings(&["a[.php"])).unwrap_err();
        assert!(matches!(err, FileProviderError::InvalidPattern { .. }));
    }

    #[test]
    fn file_system_walk_is_sorted_and_skips_vcs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/sub")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join("src/b.php"), "<?php").unwrap();
        fs::write(root.join("src/sub/a.php"), "<?php").unwrap();
        fs::write(root.join(".git/config"), "").unwrap();
        fs::write(root.join("vendor/v.php"), "<?php").unwrap();

        let mut p = FileSystemProvider::new(root);
        p.exclude_paths(&strings(&["vendor"])).unwrap();
        assert_eq!(p.file_list().unwrap(), strings(&["src/b.php", "src/sub/a.php"]));
        assert_eq!(p.file_content("src/b.php").unwrap(), b"<?php");
        assert!(matches!(
            p.file_content("nope.php"),
            Err(FileProviderError::NotFound { .. })
        ));
    }

    #[test]
    fn file_system_paths_restrict_the_walk() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a/x.php"), "").unwrap();
        fs::write(root.join("b/y.php"), "").unwrap();
        let p = FileSystemProvider::with_paths(root, vec![PathBuf::from("b")]);
        assert_eq!(p.file_list().unwrap(), strings(&["b/y.php"]));
        let missing = FileSystemProvider::with_paths(root, vec![PathBuf::from("c")]);
        assert!(missing.file_list().is_err());
    }

    #[test]
    fn in_memory_provider() {
        let mut p = InMemoryFileProvider::new()
            .with_file("b.php", "2")
            .with_file("a.php", "1");
        assert_eq!(p.file_list().unwrap(), strings(&["a.php", "b.php"]));
        p.exclude_paths(&strings(&["a.php"])).unwrap();
        assert_eq!(p.file_list().unwrap(), strings(&["b.php"]));
    }
}
