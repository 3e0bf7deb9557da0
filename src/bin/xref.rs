//! Binary entry point for the xref CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Lint the project (paths default to project.source-code-dir)
//! xref lint src/
//!
//! # Pre-commit: new defects in modified files, working tree or staged
//! xref lint --git
//! xref lint --git-cached
//!
//! # One revision, or new defects between two
//! xref lint --git-rev=v1.2
//! xref lint --git-rev=v1.2:HEAD
//!
//! # Create .xref/xref.toml and warm the cache
//! xref init
//! ```

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use xref::cli::{run_doc, run_init, run_lint, build_registry, LintOptions, LintTarget};
use xref::config::{self, parse_define, ConfigSources, LoadedConfig};
use xref::output::{write_error_map, write_report, write_stats, OutputFormat, ReportSummary};
use xref_core::error::XrefError;
use xref_core::scm::RevisionSpec;

// ============================================================================
// CLI Structure
// ============================================================================

/// Find problems in PHP source code.
#[derive(Parser, Debug)]
#[command(name = "xref", version, about = "Find problems in PHP source code")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Project file to read, or `default` for none (overrides XREF_CONFIG).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override a config value, e.g. `-d lint.report-level=notice`.
    #[arg(short = 'd', long = "define", global = true, value_parser = parse_define)]
    defines: Vec<(String, String)>,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lint files, or the changes between two git revisions.
    Lint {
        /// Files or directories (default: project.source-code-dir, then the project root).
        paths: Vec<PathBuf>,

        #[arg(short = 'o', long, value_enum, default_value = "text")]
        output: OutputFormat,

        /// Shortcut for `-d lint.report-level=<LEVEL>` (error, warning, notice or 1-4).
        #[arg(short = 'r', long)]
        report_level: Option<String>,

        /// Don't read or write the lint cache.
        #[arg(long)]
        no_cache: bool,

        /// New defects in modified tracked files (HEAD against the working tree).
        #[arg(long, conflicts_with_all = ["git_cached", "git_rev"])]
        git: bool,

        /// New defects in files staged for commit (HEAD against the index).
        #[arg(long, conflicts_with = "git_rev")]
        git_cached: bool,

        /// `<rev>` lints one revision; `<from>:<to>` finds defects added between them.
        #[arg(long, value_name = "REV")]
        git_rev: Option<String>,

        /// Print engine and defect statistics after the report.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Create .xref/xref.toml and initialize the lint cache.
    Init,

    /// List every error code with its severity.
    Errors {
        #[arg(short = 'o', long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Generate the declaration index for the project.
    Doc {
        /// Output directory (default: <data-dir>/doc).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("xref: {}", err);
            ExitCode::from(err.error_code().code())
        }
    }
}

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<u8, XrefError> {
    let cwd = std::env::current_dir()
        .map_err(|e| XrefError::internal(format!("cannot determine current directory: {}", e)))?;
    let mut sources = ConfigSources::from_env(cwd.clone());
    sources.config_path = cli.global.config.clone();
    sources.defines = cli.global.defines.clone();
    let load = || config::load(&sources).map_err(XrefError::from);

    match cli.command {
        Command::Lint {
            paths,
            output,
            report_level,
            no_cache,
            git,
            git_cached,
            git_rev,
            verbose,
        } => {
            let mut config = load()?;
            if let Some(level) = report_level {
                config.settings.set_str("lint.report-level", &level)?;
            }
            let target = lint_target(paths, git, git_cached, git_rev)?;
            execute_lint(&config, target, !no_cache, output, verbose)
        }
        Command::Init => {
            let outcome = run_init(&cwd, load)?;
            let verb = if outcome.created { "created" } else { "kept" };
            println!("{} {}", verb, outcome.config_file.display());
            println!("indexed {} files", outcome.stats.total_files);
            Ok(0)
        }
        Command::Errors { output } => {
            let config = load()?;
            let registry = build_registry(&config.settings)?;
            write_error_map(&registry.error_map(), output, &mut io::stdout().lock())
                .map_err(|e| XrefError::internal(e.to_string()))?;
            Ok(0)
        }
        Command::Doc { output_dir } => {
            let config = load()?;
            let outcome = run_doc(&config, output_dir.as_deref())?;
            let mut out = io::stdout().lock();
            write_report(&outcome.problems, OutputFormat::Text, false, &mut out)
                .and_then(|_| {
                    writeln!(
                        out,
                        "wrote {} files to {}",
                        outcome.written.len(),
                        outcome.output_dir.display()
                    )
                })
                .map_err(|e| XrefError::internal(e.to_string()))?;
            Ok(0)
        }
    }
}

fn lint_target(
    paths: Vec<PathBuf>,
    git: bool,
    git_cached: bool,
    git_rev: Option<String>,
) -> Result<LintTarget, XrefError> {
    let git_mode = git || git_cached || git_rev.is_some();
    if git_mode && !paths.is_empty() {
        warn!("file names are ignored in git mode");
    }
    if let Some(spec) = git_rev {
        let spec: RevisionSpec = spec.parse()?;
        return Ok(LintTarget::GitRevision(spec));
    }
    Ok(if git_cached {
        LintTarget::GitCached
    } else if git {
        LintTarget::GitWorkingTree
    } else {
        LintTarget::Paths(paths)
    })
}

fn execute_lint(
    config: &LoadedConfig,
    target: LintTarget,
    use_cache: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<u8, XrefError> {
    let outcome = run_lint(config, &LintOptions { target, use_cache })?;
    let summary = ReportSummary::of(&outcome.report);

    let stdout = io::stdout();
    let color = config.settings.color.enabled(stdout.is_terminal());
    let mut out = stdout.lock();
    write_report(&outcome.report, format, color, &mut out)
        .and_then(|_| {
            if verbose && format == OutputFormat::Text {
                write_stats(&outcome.stats, &summary, &mut out)
            } else {
                Ok(())
            }
        })
        .and_then(|_| out.flush())
        .map_err(|e| XrefError::internal(e.to_string()))?;

    Ok(summary.exit_code())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn lint_defaults() {
            let cli = Cli::try_parse_from(["xref", "lint"]).unwrap();
            match cli.command {
                Command::Lint {
                    paths,
                    output,
                    no_cache,
                    git,
                    ..
                } => {
                    assert!(paths.is_empty());
                    assert_eq!(output, OutputFormat::Text);
                    assert!(!no_cache);
                    assert!(!git);
                }
                _ => panic!("expected Lint"),
            }
        }

        #[test]
        fn defines_and_config_are_global() {
            let cli = Cli::try_parse_from([
                "xref",
                "lint",
                "-d",
                "lint.report-level=notice",
                "--define",
                "xref.project-check=false",
                "--config",
                "default",
            ])
            .unwrap();
            assert_eq!(cli.global.defines.len(), 2);
            assert_eq!(cli.global.defines[0].0, "lint.report-level");
            assert_eq!(cli.global.config.as_deref(), Some("default"));
        }

        #[test]
        fn malformed_define_is_rejected() {
            assert!(Cli::try_parse_from(["xref", "lint", "-d", "novalue"]).is_err());
        }

        #[test]
        fn git_modes_conflict() {
            assert!(Cli::try_parse_from(["xref", "lint", "--git", "--git-cached"]).is_err());
            assert!(Cli::try_parse_from(["xref", "lint", "--git-cached", "--git-rev=HEAD"]).is_err());
        }

        #[test]
        fn json_output_and_report_level() {
            let cli = Cli::try_parse_from(["xref", "lint", "-o", "json", "-r", "error", "src"]).unwrap();
            match cli.command {
                Command::Lint {
                    output,
                    report_level,
                    paths,
                    ..
                } => {
                    assert_eq!(output, OutputFormat::Json);
                    assert_eq!(report_level.as_deref(), Some("error"));
                    assert_eq!(paths, vec![PathBuf::from("src")]);
                }
                _ => panic!("expected Lint"),
            }
        }
    }

    mod targets {
        use super::*;
        use xref_core::scm::Revision;

        #[test]
        fn git_rev_range_and_single() {
            assert_eq!(
                lint_target(vec![], false, false, Some("v1:v2".into())).unwrap(),
                LintTarget::GitRevision(RevisionSpec::Range(
                    Revision::Id("v1".into()),
                    Revision::Id("v2".into())
                ))
            );
            assert_eq!(
                lint_target(vec![], false, false, Some("HEAD".into())).unwrap(),
                LintTarget::GitRevision(RevisionSpec::Single(Revision::Head))
            );
        }

        #[test]
        fn plain_paths_without_git() {
            let paths = vec![PathBuf::from("a.php")];
            assert_eq!(
                lint_target(paths.clone(), false, false, None).unwrap(),
                LintTarget::Paths(paths)
            );
            assert_eq!(
                lint_target(vec![], false, true, None).unwrap(),
                LintTarget::GitCached
            );
        }

        #[test]
        fn empty_revision_is_an_error() {
            let err = lint_target(vec![], false, false, Some(String::new())).unwrap_err();
            assert_eq!(err.error_code().code(), 3);
        }
    }
}
