//! Configuration resolution.
//!
//! Settings come from five layers, each overriding the previous one:
//!
//! 1. built-in defaults
//! 2. the project file `.xref/xref.toml`
//! 3. environment (`XREF_REPORT_LEVEL`)
//! 4. `--define key=value` arguments
//! 5. dedicated command-line flags (applied by the caller through [`Settings::set`])
//!
//! The project file is taken from `--config`, else from `XREF_CONFIG`, else
//! found by searching upward from the working directory. The value `default`
//! in either place means "no file, defaults only".
//!
//! Every layer goes through the same per-key setter, so a key accepts the same
//! values whether it comes from TOML or from a `key=value` string.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use xref_core::defect::Severity;
use xref_core::registry::ConfigurationError;

/// Directory holding the project file and, by default, the cache.
pub const CONFIG_DIR: &str = ".xref";
pub const CONFIG_FILE_NAME: &str = "xref.toml";

/// Explicit project file path, or `default`.
pub const CONFIG_ENV: &str = "XREF_CONFIG";
/// Overrides `lint.report-level`.
pub const REPORT_LEVEL_ENV: &str = "XREF_REPORT_LEVEL";

/// Value of `--config` / `XREF_CONFIG` that disables the project file.
pub const NO_CONFIG_FILE: &str = "default";

// ============================================================================
// Settings
// ============================================================================

/// Where cached lint results go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageManager {
    /// Files under `xref.data-dir`.
    File,
    /// Process memory; gone when the run ends.
    Memory,
    /// No caching.
    None,
}

impl FromStr for StorageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageManager::File),
            "memory" => Ok(StorageManager::Memory),
            "none" | "off" => Ok(StorageManager::None),
            _ => Err("expected 'file', 'memory' or 'none'".to_string()),
        }
    }
}

/// Whether text output is colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Colored when stdout is a terminal.
    Auto,
    On,
    Off,
}

impl ColorMode {
    pub fn enabled(self, is_terminal: bool) -> bool {
        match self {
            ColorMode::Auto => is_terminal,
            ColorMode::On => true,
            ColorMode::Off => false,
        }
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ColorMode::Auto),
            "on" | "true" | "yes" | "1" => Ok(ColorMode::On),
            "off" | "false" | "no" | "0" => Ok(ColorMode::Off),
            _ => Err("expected 'auto', 'on' or 'off'".to_string()),
        }
    }
}

/// Source control backend used by the `--git*` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCodeManagerKind {
    Git,
}

impl FromStr for SourceCodeManagerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(SourceCodeManagerKind::Git),
            _ => Err("only 'git' is supported".to_string()),
        }
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_name: Option<String>,
    /// Paths linted when none are given on the command line.
    pub source_code_dirs: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub data_dir: String,
    pub project_check: bool,
    pub storage_manager: StorageManager,
    pub report_level: Severity,
    pub ignore_errors: Vec<String>,
    pub ignore_missing_class: Vec<String>,
    pub color: ColorMode,
    pub git_repository_dir: Option<String>,
    pub git_command_timeout_secs: u64,
    pub source_code_manager: SourceCodeManagerKind,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            project_name: None,
            source_code_dirs: Vec::new(),
            exclude_paths: Vec::new(),
            data_dir: CONFIG_DIR.to_string(),
            project_check: true,
            storage_manager: StorageManager::File,
            report_level: Severity::Warning,
            ignore_errors: Vec::new(),
            ignore_missing_class: xref_php::DEFAULT_IGNORE_MISSING_CLASS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            color: ColorMode::Auto,
            git_repository_dir: None,
            git_command_timeout_secs: 30,
            source_code_manager: SourceCodeManagerKind::Git,
        }
    }
}

/// Every key [`Settings::set`] understands.
pub const KNOWN_KEYS: &[&str] = &[
    "project.name",
    "project.source-code-dir",
    "project.exclude-path",
    "xref.data-dir",
    "xref.project-check",
    "xref.storage-manager",
    "lint.report-level",
    "lint.ignore-error",
    "lint.ignore-missing-class",
    "lint.color",
    "git.repository-dir",
    "git.command-timeout-secs",
    "ci.source-code-manager",
];

impl Settings {
    /// Set one dotted key. Strings are accepted for every key, so values from
    /// the environment and from `--define` go through here unchanged.
    pub fn set(&mut self, key: &str, value: &toml::Value) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: display_value(value),
            reason: reason.to_string(),
        };

        match key {
            "project.name" => self.project_name = Some(as_string(value).ok_or_else(|| invalid("expected a string"))?),
            "project.source-code-dir" => {
                self.source_code_dirs = as_list(value).ok_or_else(|| invalid("expected a list of paths"))?
            }
            "project.exclude-path" => {
                self.exclude_paths = as_list(value).ok_or_else(|| invalid("expected a list of paths"))?
            }
            "xref.data-dir" => self.data_dir = as_string(value).ok_or_else(|| invalid("expected a path"))?,
            "xref.project-check" => {
                self.project_check = as_bool(value).ok_or_else(|| invalid("expected true or false"))?
            }
            "xref.storage-manager" => self.storage_manager = parse_string(value).map_err(|r| invalid(&r))?,
            "lint.report-level" => {
                let text = as_string(value).ok_or_else(|| invalid("expected a level name or number"))?;
                self.report_level = text.parse()?;
            }
            "lint.ignore-error" => {
                self.ignore_errors = as_list(value).ok_or_else(|| invalid("expected a list of error codes"))?
            }
            "lint.ignore-missing-class" => {
                self.ignore_missing_class =
                    as_list(value).ok_or_else(|| invalid("expected a list of class names"))?
            }
            "lint.color" => self.color = parse_string(value).map_err(|r| invalid(&r))?,
            "git.repository-dir" => {
                self.git_repository_dir = Some(as_string(value).ok_or_else(|| invalid("expected a path"))?)
            }
            "git.command-timeout-secs" => {
                self.git_command_timeout_secs = as_u64(value)
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| invalid("expected a positive number of seconds"))?
            }
            "ci.source-code-manager" => self.source_code_manager = parse_string(value).map_err(|r| invalid(&r))?,
            _ => return Err(invalid("unknown config var")),
        }
        Ok(())
    }

    /// [`set`](Self::set) with a plain string value.
    pub fn set_str(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError> {
        self.set(key, &toml::Value::String(value.to_string()))
    }

    /// Apply every key of a parsed project file.
    pub fn apply_table(&mut self, table: &toml::Table) -> Result<(), ConfigurationError> {
        for (section, entries) in table {
            let Some(entries) = entries.as_table() else {
                return Err(ConfigurationError::InvalidValue {
                    key: section.clone(),
                    value: display_value(entries),
                    reason: "expected a [section]".to_string(),
                });
            };
            for (name, value) in entries {
                self.set(&format!("{}.{}", section, name), value)?;
            }
        }
        Ok(())
    }
}

fn display_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn parse_string<T: FromStr<Err = String>>(value: &toml::Value) -> Result<T, String> {
    as_string(value)
        .ok_or_else(|| "expected a string".to_string())?
        .parse()
}

fn as_bool(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::Integer(i) => Some(*i != 0),
        toml::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(true),
            "false" | "off" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_u64(value: &toml::Value) -> Option<u64> {
    match value {
        toml::Value::Integer(i) => u64::try_from(*i).ok(),
        toml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Arrays as-is; a string is a comma-separated list (empty string, empty list).
fn as_list(value: &toml::Value) -> Option<Vec<String>> {
    match value {
        toml::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        toml::Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Inputs to configuration resolution, gathered by the caller.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// `--config`.
    pub config_path: Option<String>,
    /// `XREF_CONFIG`.
    pub env_config_path: Option<String>,
    /// `XREF_REPORT_LEVEL`.
    pub env_report_level: Option<String>,
    /// `--define key=value`, in command-line order.
    pub defines: Vec<(String, String)>,
    /// Where the upward search starts and the project root when no file is found.
    pub start_dir: PathBuf,
}

impl ConfigSources {
    /// Sources from the process environment, searching from `start_dir`.
    pub fn from_env(start_dir: PathBuf) -> Self {
        ConfigSources {
            env_config_path: std::env::var(CONFIG_ENV).ok().filter(|v| !v.is_empty()),
            env_report_level: std::env::var(REPORT_LEVEL_ENV).ok().filter(|v| !v.is_empty()),
            start_dir,
            ..Default::default()
        }
    }
}

/// Result of resolution.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub settings: Settings,
    /// The project file that was read, if any.
    pub file: Option<PathBuf>,
    /// Directory relative paths in the settings are resolved against.
    pub root: PathBuf,
}

impl LoadedConfig {
    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.settings.data_dir)
    }

    pub fn git_repository_dir(&self) -> PathBuf {
        match &self.settings.git_repository_dir {
            Some(dir) => self.resolve(dir),
            None => self.root.clone(),
        }
    }
}

/// Parse one `--define` argument.
pub fn parse_define(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid define '{}', expected 'key=value'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid define '{}', empty key", arg));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Nearest `.xref/xref.toml` at or above `start`.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Project root for a config file: the parent of `.xref/`, or the file's own
/// directory when it lives elsewhere.
fn root_of(file: &Path) -> PathBuf {
    let dir = file.parent().unwrap_or(Path::new("."));
    if dir.file_name().is_some_and(|name| name == CONFIG_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

pub fn read_config_file(path: &Path) -> Result<toml::Table, ConfigurationError> {
    let unreadable = |reason: String| ConfigurationError::Unreadable {
        path: path.display().to_string(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    text.parse::<toml::Table>()
        .map_err(|e| unreadable(e.message().to_string()))
}

/// Resolve settings from every layer except dedicated command-line flags.
pub fn load(sources: &ConfigSources) -> Result<LoadedConfig, ConfigurationError> {
    let explicit = sources
        .config_path
        .as_deref()
        .or(sources.env_config_path.as_deref());

    let file = match explicit {
        Some(NO_CONFIG_FILE) => None,
        Some(path) => {
            let path = sources.start_dir.join(path);
            if !path.is_file() {
                return Err(ConfigurationError::Unreadable {
                    path: path.display().to_string(),
                    reason: "no such file".to_string(),
                });
            }
            Some(path)
        }
        None => find_config_file(&sources.start_dir),
    };

    let mut settings = Settings::default();
    if let Some(path) = &file {
        debug!(path = %path.display(), "reading config file");
        settings.apply_table(&read_config_file(path)?)?;
    }
    if let Some(level) = &sources.env_report_level {
        settings.set_str("lint.report-level", level)?;
    }
    for (key, value) in &sources.defines {
        settings.set_str(key, value)?;
    }

    let root = match &file {
        Some(path) => root_of(path),
        None => sources.start_dir.clone(),
    };
    Ok(LoadedConfig {
        settings,
        file,
        root,
    })
}

/// Contents of a fresh project file.
pub fn default_config_text(project_name: &str) -> String {
    let ignore = xref_php::DEFAULT_IGNORE_MISSING_CLASS
        .iter()
        .map(|name| toml::Value::String(name.to_string()).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "[project]\n\
         name = {name}\n\
         source-code-dir = [\".\"]\n\
         exclude-path = []\n\
         \n\
         [xref]\n\
         data-dir = \"{data_dir}\"\n\
         project-check = true\n\
         storage-manager = \"file\"\n\
         \n\
         [lint]\n\
         report-level = \"warning\"\n\
         color = \"auto\"\n\
         ignore-error = []\n\
         ignore-missing-class = [{ignore}]\n\
         \n\
         [ci]\n\
         source-code-manager = \"git\"\n",
        name = toml::Value::String(project_name.to_string()),
        data_dir = CONFIG_DIR,
        ignore = ignore,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, text: &str) -> PathBuf {
        let config_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join(CONFIG_FILE_NAME);
        fs::write(&path, text).unwrap();
        path
    }

    fn sources(start_dir: &Path) -> ConfigSources {
        ConfigSources {
            start_dir: start_dir.to_path_buf(),
            ..Default::default()
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn defaults() {
            let settings = Settings::default();
            assert_eq!(settings.report_level, Severity::Warning);
            assert!(settings.project_check);
            assert_eq!(settings.storage_manager, StorageManager::File);
            assert_eq!(
                settings.ignore_missing_class,
                vec!["PEAR", "PHPUnit_Framework_TestCase"]
            );
        }

        #[test]
        fn strings_work_for_every_kind() {
            let mut settings = Settings::default();
            settings.set_str("xref.project-check", "off").unwrap();
            settings.set_str("lint.report-level", "3").unwrap();
            settings.set_str("lint.ignore-error", "uv01, lc01").unwrap();
            settings.set_str("git.command-timeout-secs", "5").unwrap();
            settings.set_str("lint.color", "on").unwrap();
            assert!(!settings.project_check);
            assert_eq!(settings.report_level, Severity::Error);
            assert_eq!(settings.ignore_errors, vec!["uv01", "lc01"]);
            assert_eq!(settings.git_command_timeout_secs, 5);
            assert_eq!(settings.color, ColorMode::On);
        }

        #[test]
        fn bad_values_are_configuration_errors() {
            let mut settings = Settings::default();
            assert!(matches!(
                settings.set_str("lint.report-level", "loud"),
                Err(ConfigurationError::UnknownReportLevel { .. })
            ));
            assert!(matches!(
                settings.set_str("xref.storage-manager", "redis"),
                Err(ConfigurationError::InvalidValue { .. })
            ));
            assert!(matches!(
                settings.set_str("git.command-timeout-secs", "0"),
                Err(ConfigurationError::InvalidValue { .. })
            ));
            let err = settings.set_str("lint.nonsense", "1").unwrap_err();
            assert!(err.to_string().contains("lint.nonsense"));
        }

        #[test]
        fn every_known_key_is_settable() {
            let samples = [
                ("project.name", "demo"),
                ("project.source-code-dir", "src,lib"),
                ("project.exclude-path", "vendor"),
                ("xref.data-dir", ".cache"),
                ("xref.project-check", "true"),
                ("xref.storage-manager", "memory"),
                ("lint.report-level", "notice"),
                ("lint.ignore-error", "xr003"),
                ("lint.ignore-missing-class", "PEAR"),
                ("lint.color", "auto"),
                ("git.repository-dir", "."),
                ("git.command-timeout-secs", "10"),
                ("ci.source-code-manager", "git"),
            ];
            assert_eq!(samples.len(), KNOWN_KEYS.len());
            let mut settings = Settings::default();
            for (key, value) in samples {
                assert!(KNOWN_KEYS.contains(&key));
                settings.set_str(key, value).unwrap();
            }
        }

        #[test]
        fn defines_split_on_the_first_equals() {
            assert_eq!(
                parse_define("project.name=a=b").unwrap(),
                ("project.name".to_string(), "a=b".to_string())
            );
            assert!(parse_define("project.name").is_err());
            assert!(parse_define("=x").is_err());
        }
    }

    mod loading {
        use super::*;

        #[test]
        fn no_file_means_defaults_rooted_at_start() {
            let tmp = TempDir::new().unwrap();
            let loaded = load(&sources(tmp.path())).unwrap();
            assert!(loaded.file.is_none());
            assert_eq!(loaded.root, tmp.path());
            assert_eq!(loaded.settings, Settings::default());
        }

        #[test]
        fn upward_search_finds_the_project_file() {
            let tmp = TempDir::new().unwrap();
            write_config(
                tmp.path(),
                "[project]\nname = \"demo\"\nexclude-path = [\"vendor\"]\n[lint]\nreport-level = \"error\"\n",
            );
            let nested = tmp.path().join("src").join("deep");
            fs::create_dir_all(&nested).unwrap();

            let loaded = load(&sources(&nested)).unwrap();
            assert_eq!(loaded.root, tmp.path());
            assert_eq!(loaded.settings.project_name.as_deref(), Some("demo"));
            assert_eq!(loaded.settings.exclude_paths, vec!["vendor"]);
            assert_eq!(loaded.settings.report_level, Severity::Error);
            assert_eq!(loaded.data_dir(), tmp.path().join(".xref"));
        }

        #[test]
        fn precedence_file_env_define() {
            let tmp = TempDir::new().unwrap();
            write_config(tmp.path(), "[lint]\nreport-level = \"error\"\ncolor = \"off\"\n");

            let mut src = sources(tmp.path());
            src.env_report_level = Some("notice".to_string());
            let loaded = load(&src).unwrap();
            assert_eq!(loaded.settings.report_level, Severity::Notice);
            assert_eq!(loaded.settings.color, ColorMode::Off);

            src.defines = vec![("lint.report-level".to_string(), "fatal".to_string())];
            let loaded = load(&src).unwrap();
            assert_eq!(loaded.settings.report_level, Severity::Fatal);
        }

        #[test]
        fn explicit_default_skips_the_file() {
            let tmp = TempDir::new().unwrap();
            write_config(tmp.path(), "[lint]\nreport-level = \"error\"\n");

            let mut src = sources(tmp.path());
            src.env_config_path = Some(NO_CONFIG_FILE.to_string());
            let loaded = load(&src).unwrap();
            assert!(loaded.file.is_none());
            assert_eq!(loaded.settings.report_level, Severity::Warning);
        }

        #[test]
        fn command_line_path_beats_environment() {
            let tmp = TempDir::new().unwrap();
            let other = tmp.path().join("other.toml");
            fs::write(&other, "[xref]\nproject-check = false\n").unwrap();

            let mut src = sources(tmp.path());
            src.env_config_path = Some("missing.toml".to_string());
            src.config_path = Some("other.toml".to_string());
            let loaded = load(&src).unwrap();
            assert!(!loaded.settings.project_check);
            assert_eq!(loaded.root, tmp.path());

            src.config_path = None;
            assert!(matches!(load(&src), Err(ConfigurationError::Unreadable { .. })));
        }

        #[test]
        fn malformed_files_are_rejected() {
            let tmp = TempDir::new().unwrap();
            write_config(tmp.path(), "[lint\n");
            assert!(matches!(
                load(&sources(tmp.path())),
                Err(ConfigurationError::Unreadable { .. })
            ));

            write_config(tmp.path(), "report-level = \"error\"\n");
            assert!(matches!(
                load(&sources(tmp.path())),
                Err(ConfigurationError::InvalidValue { .. })
            ));
        }

        #[test]
        fn generated_file_loads_to_defaults() {
            let tmp = TempDir::new().unwrap();
            write_config(tmp.path(), &default_config_text("my \"app\""));
            let loaded = load(&sources(tmp.path())).unwrap();
            let expected = Settings {
                project_name: Some("my \"app\"".to_string()),
                source_code_dirs: vec![".".to_string()],
                ..Settings::default()
            };
            assert_eq!(loaded.settings, expected);
        }
    }
}
