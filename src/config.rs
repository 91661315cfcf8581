//! Configuration for dlm.
//!
//! Settings are read from a TOML file. They cover the classifier command,
//! the default batch size, an optional directory of prompt templates, and the
//! scan rules that decide which files are sent to the classifier at all.
//!
//! # Configuration File Format
//!
//! ```toml
//! batch_size = 100
//!
//! [classifier]
//! command = "gemini"
//! args = []
//! prompts_dir = "/home/me/.config/dlm/prompts"
//!
//! [scan]
//! include_hidden = false
//!
//! [scan.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.part"]
//! extensions = ["crdownload"]
//! regex = []
//!
//! [scan.include]
//! patterns = []
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Batch size used when neither the command line nor the config sets one.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors that can occur while loading or compiling configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DlmConfig {
    /// Files per classifier request. The `--batch-size` flag wins over this.
    #[serde(default)]
    pub batch_size: Option<usize>,

    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub scan: ScanRules,
}

/// How to reach the external classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Program to run. It receives `--prompt` and `--include-directories`.
    #[serde(default = "default_command")]
    pub command: String,

    /// Extra arguments placed before the prompt.
    #[serde(default)]
    pub args: Vec<String>,

    /// Directory holding prompt template overrides.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
}

fn default_command() -> String {
    "gemini".to_string()
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            prompts_dir: None,
        }
    }
}

/// Which first-level files are offered to the classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanRules {
    /// Whether names starting with "." are scanned. Defaults to false.
    #[serde(default)]
    pub include_hidden: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Patterns that override every exclusion.
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for leaving files out of classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames (e.g. ".DS_Store").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the filename (e.g. "*.part").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Extensions without the dot, compared case-insensitively.
    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for forcing files into classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl DlmConfig {
    /// Loads configuration for a directory.
    ///
    /// Lookup order:
    /// 1. `config_path`, if given (it must exist)
    /// 2. `<directory>/.dlm/config.toml`
    /// 3. `~/.config/dlm/config.toml`
    /// 4. built-in defaults
    pub fn load(config_path: Option<&Path>, directory: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local = directory.join(".dlm").join("config.toml");
        if local.exists() {
            return Self::load_from_file(&local);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("dlm")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;

        if config.batch_size == Some(0) {
            return Err(ConfigError::ConfigInvalid(
                "batch_size must be at least 1".to_string(),
            ));
        }
        tracing::debug!(config = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Picks the batch size: explicit value, then config, then the default.
    pub fn batch_size(&self, explicit: Option<usize>) -> usize {
        explicit
            .or(self.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .max(1)
    }
}

/// Scan rules with every pattern compiled up front.
#[derive(Default)]
pub struct ScanFilter {
    include_hidden: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl ScanFilter {
    /// Compiles scan rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn new(rules: &ScanRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(p).map_err(|_| ConfigError::InvalidGlobPattern(p.clone())))
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            include_hidden: rules.include_hidden,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Decides whether a file name is offered to the classifier.
    ///
    /// Include patterns win; otherwise hidden files, exact names, extensions,
    /// globs and regexes each exclude in turn.
    pub fn should_include(&self, file_name: &str) -> bool {
        if self.include_patterns.iter().any(|p| p.matches(file_name)) {
            return true;
        }

        if !self.include_hidden && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name) {
            return false;
        }

        if let Some(ext) = Path::new(file_name).extension()
            && self
                .exclude_extensions
                .contains(&ext.to_string_lossy().to_lowercase())
        {
            return false;
        }

        if self.exclude_patterns.iter().any(|p| p.matches(file_name)) {
            return false;
        }

        !self.exclude_regexes.iter().any(|r| r.is_match(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter_from(toml_text: &str) -> ScanFilter {
        let config: DlmConfig = toml::from_str(toml_text).expect("invalid test config");
        ScanFilter::new(&config.scan).expect("failed to compile filter")
    }

    #[test]
    fn test_defaults() {
        let config = DlmConfig::default();
        assert_eq!(config.classifier.command, "gemini");
        assert_eq!(config.batch_size(None), DEFAULT_BATCH_SIZE);
        assert!(!config.scan.include_hidden);
    }

    #[test]
    fn test_batch_size_precedence() {
        let config: DlmConfig = toml::from_str("batch_size = 25").expect("invalid config");
        assert_eq!(config.batch_size(None), 25);
        assert_eq!(config.batch_size(Some(7)), 7);
    }

    #[test]
    fn test_hidden_files_excluded_by_default() {
        let filter = ScanFilter::default();
        assert!(!filter.should_include(".DS_Store"));
        assert!(filter.should_include("report.pdf"));
    }

    #[test]
    fn test_hidden_files_included_when_enabled() {
        let filter = filter_from("[scan]\ninclude_hidden = true");
        assert!(filter.should_include(".bashrc"));
    }

    #[test]
    fn test_exclusions() {
        let filter = filter_from(
            r#"
            [scan.exclude]
            filenames = ["Thumbs.db"]
            patterns = ["*.part"]
            extensions = [".CRDOWNLOAD"]
            regex = ["^tmp_\\d+$"]
            "#,
        );

        assert!(!filter.should_include("Thumbs.db"));
        assert!(!filter.should_include("movie.mkv.part"));
        assert!(!filter.should_include("setup.crdownload"));
        assert!(!filter.should_include("tmp_123"));
        assert!(filter.should_include("tmp_abc"));
        assert!(filter.should_include("movie.mkv"));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let filter = filter_from(
            r#"
            [scan.exclude]
            extensions = ["log"]
            [scan.include]
            patterns = ["keep*.log"]
            "#,
        );

        assert!(!filter.should_include("debug.log"));
        assert!(filter.should_include("keep-this.log"));
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        let config: DlmConfig =
            toml::from_str("[scan.exclude]\nregex = [\"[unclosed\"]").expect("invalid config");
        assert!(matches!(
            ScanFilter::new(&config.scan),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let config: DlmConfig =
            toml::from_str("[scan.exclude]\npatterns = [\"[invalid\"]").expect("invalid config");
        assert!(matches!(
            ScanFilter::new(&config.scan),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }

    #[test]
    fn test_load_from_directory_state() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let state = temp_dir.path().join(".dlm");
        fs::create_dir(&state).expect("Failed to create state dir");
        fs::write(
            state.join("config.toml"),
            "batch_size = 10\n[classifier]\ncommand = \"my-classifier\"\nargs = [\"--fast\"]",
        )
        .expect("Failed to write config");

        let config = DlmConfig::load(None, temp_dir.path()).expect("load failed");
        assert_eq!(config.batch_size(None), 10);
        assert_eq!(config.classifier.command, "my-classifier");
        assert_eq!(config.classifier.args, vec!["--fast".to_string()]);
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = DlmConfig::load(Some(&temp_dir.path().join("nope.toml")), temp_dir.path());
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_zero_batch_size_is_invalid() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "batch_size = 0").expect("Failed to write config");
        assert!(matches!(
            DlmConfig::load_from_file(&path),
            Err(ConfigError::ConfigInvalid(_))
        ));
    }
}
