//! Source code manager contract.
//!
//! A source code manager resolves revisions to file lists, file content and
//! modified-file sets. The set of modified files between two revisions is the
//! input of an incremental report; engines never compute it themselves.

mod git;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::file_provider::FileProvider;

pub use git::{GitFileProvider, GitSourceCodeManager, DEFAULT_GIT_TIMEOUT};

/// Source control failures. Fatal for the operation that hit them.
#[derive(Debug, Error)]
pub enum ScmError {
    #[error("'{path}' does not exist in revision {revision}")]
    NotFound { revision: String, path: String },

    #[error("unknown revision '{revision}'")]
    InvalidRevision { revision: String },

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("cannot run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation not supported for revision {revision}: {operation}")]
    Unsupported { revision: String, operation: String },
}

pub type ScmResult<T> = Result<T, ScmError>;

/// A point-in-time snapshot of the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Revision {
    /// Files on disk, including unstaged edits.
    WorkingTree,
    /// The staging area.
    Index,
    /// The checked-out commit.
    Head,
    /// Any other backend revision (hash, branch, tag, `HEAD~2`).
    Id(String),
}

impl Revision {
    pub fn is_commit(&self) -> bool {
        matches!(self, Revision::Head | Revision::Id(_))
    }
}

/// What a `--git-rev` argument asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSpec {
    /// `<rev>`: the full report of one revision.
    Single(Revision),
    /// `<from>:<to>`: defects introduced between two revisions.
    Range(Revision, Revision),
}

impl FromStr for RevisionSpec {
    type Err = ScmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(ScmError::InvalidRevision {
                revision: spec.to_string(),
            });
        }
        // ":disk" / ":cached" carry a leading colon of their own
        let split = spec
            .char_indices()
            .find(|&(i, c)| c == ':' && i > 0)
            .map(|(i, _)| i);
        match split {
            Some(pos) => Ok(RevisionSpec::Range(
                spec[..pos].parse()?,
                spec[pos + 1..].parse()?,
            )),
            None => Ok(RevisionSpec::Single(spec.parse()?)),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::WorkingTree => f.write_str(":disk"),
            Revision::Index => f.write_str(":cached"),
            Revision::Head => f.write_str("HEAD"),
            Revision::Id(id) => f.write_str(id),
        }
    }
}

impl FromStr for Revision {
    type Err = ScmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ScmError::InvalidRevision {
                revision: s.to_string(),
            }),
            ":disk" => Ok(Revision::WorkingTree),
            ":cached" | ":index" => Ok(Revision::Index),
            "HEAD" => Ok(Revision::Head),
            other if other.starts_with('-') => Err(ScmError::InvalidRevision {
                revision: other.to_string(),
            }),
            other => Ok(Revision::Id(other.to_string())),
        }
    }
}

/// Abstraction over a revision-control backend.
pub trait SourceCodeManager {
    /// Fetch remote changes, if the backend has remotes.
    fn update_repository(&self) -> ScmResult<()>;

    /// Branch name -> head revision id.
    fn list_of_branches(&self) -> ScmResult<BTreeMap<String, String>>;

    /// All files present at `revision`, sorted.
    fn list_of_files(&self, revision: &Revision) -> ScmResult<Vec<String>>;

    /// Paths that differ between two revisions, sorted.
    fn list_of_modified_files(&self, from: &Revision, to: &Revision) -> ScmResult<Vec<String>>;

    /// Content of `path` at `revision`; `ScmError::NotFound` if absent.
    fn file_content(&self, revision: &Revision, path: &str) -> ScmResult<Vec<u8>>;

    /// Backend metadata for a revision (author, time, subject...).
    fn revision_info(&self, revision: &Revision) -> ScmResult<BTreeMap<String, String>>;

    /// A file provider bound to `revision`.
    fn file_provider(&self, revision: &Revision) -> ScmResult<Box<dyn FileProvider>>;
}
