//! Git backend for the source code manager contract.
//!
//! Every operation shells out to `git -C <repo> ...`. Commands run with an
//! OS-level timeout (via `wait-timeout`) so a stuck fetch or a credential
//! prompt can never hang a lint run; a timed-out command is retried a bounded
//! number of times with exponential backoff before the error is surfaced.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::{Revision, ScmError, ScmResult, SourceCodeManager};
use crate::file_provider::{FileProvider, FileProviderError, FileProviderResult, PathFilter};

/// Default per-command timeout.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries after a timeout, not counting the first attempt.
const MAX_RETRIES: usize = 2;

/// Git repository accessed through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitSourceCodeManager {
    repository: PathBuf,
    timeout: Duration,
}

impl GitSourceCodeManager {
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        GitSourceCodeManager {
            repository: repository.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    // ------------------------------------------------------------------------
    // Command plumbing
    // ------------------------------------------------------------------------

    /// Run git, retrying on timeout. Returns stdout.
    fn git(&self, args: &[&str]) -> ScmResult<Vec<u8>> {
        let mut attempts = 0;
        loop {
            match self.git_once(args) {
                Err(ScmError::Timeout { command, seconds }) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!(%command, seconds, attempts, "git command timed out, retrying");
                    // Exponential backoff: 200ms, 400ms, ...
                    thread::sleep(Duration::from_millis(100 * (1 << attempts.min(6))));
                }
                other => return other,
            }
        }
    }

    fn git_once(&self, args: &[&str]) -> ScmResult<Vec<u8>> {
        let command = format!("git {}", args.first().copied().unwrap_or_default());
        debug!(repository = %self.repository.display(), ?args, "running git");

        let mut child = Command::new("git")
            .arg("-C")
            .arg(&self.repository)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ScmError::Spawn {
                command: command.clone(),
                source,
            })?;

        // Drain both pipes concurrently so a large blob cannot fill the pipe
        // buffer and stall the child until the timeout fires.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status: ExitStatus = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ScmError::Timeout {
                    command,
                    seconds: self.timeout.as_secs(),
                });
            }
            Err(source) => return Err(ScmError::Spawn { command, source }),
        };

        let stdout = stdout
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = stderr
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(ScmError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }

    /// Map a failed command on `revision` to `InvalidRevision` when the
    /// revision itself does not resolve.
    fn check_revision(&self, revision: &Revision, err: ScmError) -> ScmError {
        if !revision.is_commit() || !matches!(err, ScmError::CommandFailed { .. }) {
            return err;
        }
        let spec = format!("{}^{{commit}}", revision);
        match self.git(&["rev-parse", "--verify", "--quiet", &spec]) {
            Ok(_) => err,
            Err(_) => ScmError::InvalidRevision {
                revision: revision.to_string(),
            },
        }
    }

    fn untracked_files(&self) -> ScmResult<Vec<String>> {
        let out = self.git(&["ls-files", "-z", "--others", "--exclude-standard"])?;
        Ok(split_nul(&out))
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn split_nul(out: &[u8]) -> Vec<String> {
    out.split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

fn sorted(mut files: Vec<String>) -> Vec<String> {
    files.sort();
    files.dedup();
    files
}

impl SourceCodeManager for GitSourceCodeManager {
    fn update_repository(&self) -> ScmResult<()> {
        let remotes = self.git(&["remote"])?;
        if String::from_utf8_lossy(&remotes).trim().is_empty() {
            debug!("no remotes configured, nothing to fetch");
            return Ok(());
        }
        self.git(&["fetch", "--all", "--prune", "--quiet"])?;
        Ok(())
    }

    fn list_of_branches(&self) -> ScmResult<BTreeMap<String, String>> {
        let out = self.git(&[
            "for-each-ref",
            "--format=%(refname:short)%00%(objectname)",
            "refs/heads",
            "refs/remotes",
        ])?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .filter_map(|line| {
                let (name, id) = line.split_once('\0')?;
                Some((name.to_string(), id.to_string()))
            })
            .collect())
    }

    fn list_of_files(&self, revision: &Revision) -> ScmResult<Vec<String>> {
        let files = match revision {
            Revision::Head | Revision::Id(_) => {
                let rev = revision.to_string();
                let out = self
                    .git(&["ls-tree", "-r", "-z", "--name-only", &rev])
                    .map_err(|e| self.check_revision(revision, e))?;
                split_nul(&out)
            }
            Revision::Index => split_nul(&self.git(&["ls-files", "-z", "--cached"])?),
            Revision::WorkingTree => {
                let out = self.git(&["ls-files", "-z", "--cached", "--others", "--exclude-standard"])?;
                split_nul(&out)
                    .into_iter()
                    .filter(|p| self.repository.join(p).is_file())
                    .collect()
            }
        };
        Ok(sorted(files))
    }

    fn list_of_modified_files(&self, from: &Revision, to: &Revision) -> ScmResult<Vec<String>> {
        if from == to {
            return Ok(Vec::new());
        }

        let base = ["diff", "--name-only", "-z", "--no-renames"];
        let (commit, other) = match (from, to) {
            (a, b) if a.is_commit() && b.is_commit() => {
                let (a, b) = (a.to_string(), b.to_string());
                let mut args = base.to_vec();
                args.extend([a.as_str(), b.as_str()]);
                let out = self.git(&args).map_err(|e| {
                    let e = self.check_revision(from, e);
                    match e {
                        ScmError::InvalidRevision { .. } => e,
                        e => self.check_revision(to, e),
                    }
                })?;
                return Ok(sorted(split_nul(&out)));
            }
            (a, b) if a.is_commit() => (Some(a), b),
            (a, b) if b.is_commit() => (Some(b), a),
            // index against working tree, in either order
            (a, b) => (None, if *a == Revision::WorkingTree { a } else { b }),
        };

        let commit_text = commit.map(|c| c.to_string());
        let mut args = base.to_vec();
        if *other == Revision::Index {
            args.push("--cached");
        }
        if let Some(c) = &commit_text {
            args.push(c.as_str());
        }
        let out = self.git(&args).map_err(|e| match commit {
            Some(c) => self.check_revision(c, e),
            None => e,
        })?;

        let mut files = split_nul(&out);
        if *other == Revision::WorkingTree {
            files.extend(self.untracked_files()?);
        }
        Ok(sorted(files))
    }

    fn file_content(&self, revision: &Revision, path: &str) -> ScmResult<Vec<u8>> {
        let not_found = || ScmError::NotFound {
            revision: revision.to_string(),
            path: path.to_string(),
        };
        match revision {
            Revision::WorkingTree => fs::read(self.repository.join(path)).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    not_found()
                } else {
                    ScmError::Spawn {
                        command: format!("read {}", path),
                        source: e,
                    }
                }
            }),
            Revision::Index => {
                let object = format!(":{}", path);
                self.git(&["cat-file", "blob", &object]).map_err(|e| match e {
                    ScmError::CommandFailed { .. } => not_found(),
                    e => e,
                })
            }
            Revision::Head | Revision::Id(_) => {
                let object = format!("{}:{}", revision, path);
                self.git(&["cat-file", "blob", &object]).map_err(|e| {
                    match self.check_revision(revision, e) {
                        ScmError::CommandFailed { .. } => not_found(),
                        e => e,
                    }
                })
            }
        }
    }

    fn revision_info(&self, revision: &Revision) -> ScmResult<BTreeMap<String, String>> {
        let commit = if revision.is_commit() {
            revision.clone()
        } else {
            Revision::Head
        };
        let rev = commit.to_string();
        let result = self
            .git(&["log", "-1", "--format=%H%x00%an%x00%ae%x00%at%x00%s", &rev, "--"])
            .map_err(|e| self.check_revision(&commit, e));

        let mut info = BTreeMap::new();
        info.insert("revision".to_string(), revision.to_string());
        let out = match result {
            Ok(out) => out,
            // an uncommitted working tree still has an identity
            Err(_) if !revision.is_commit() => return Ok(info),
            Err(e) => return Err(e),
        };

        let text = String::from_utf8_lossy(&out);
        let fields: Vec<&str> = text.trim_end_matches('\n').split('\0').collect();
        for (key, value) in ["H", "an", "ae", "at", "s"].iter().zip(fields) {
            let value = if *key == "at" {
                value
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| value.to_string())
            } else {
                value.to_string()
            };
            info.insert(key.to_string(), value);
        }
        Ok(info)
    }

    fn file_provider(&self, revision: &Revision) -> ScmResult<Box<dyn FileProvider>> {
        Ok(Box::new(GitFileProvider::new(self.clone(), revision.clone())))
    }
}

// ============================================================================
// Git File Provider
// ============================================================================

/// File provider bound to one git revision.
#[derive(Debug, Clone)]
pub struct GitFileProvider {
    scm: GitSourceCodeManager,
    revision: Revision,
    filter: PathFilter,
}

impl GitFileProvider {
    pub fn new(scm: GitSourceCodeManager, revision: Revision) -> Self {
        GitFileProvider {
            scm,
            revision,
            filter: PathFilter::new(),
        }
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }
}

impl FileProvider for GitFileProvider {
    fn file_list(&self) -> FileProviderResult<Vec<String>> {
        Ok(self
            .scm
            .list_of_files(&self.revision)?
            .into_iter()
            .filter(|p| !self.filter.is_excluded(p))
            .collect())
    }

    fn file_content(&self, path: &str) -> FileProviderResult<Vec<u8>> {
        self.scm
            .file_content(&self.revision, path)
            .map_err(|e| match e {
                ScmError::NotFound { path, .. } => FileProviderError::NotFound { path },
                e => FileProviderError::Scm(e),
            })
    }

    fn exclude_paths(&mut self, patterns: &[String]) -> FileProviderResult<()> {
        self.filter.add(patterns)
    }
}
