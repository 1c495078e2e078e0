/// Configuration module for cproject-graph.
///
/// Handles loading, validating, and providing default configuration values
/// for the preprocessing pipeline, the relation analyzer and the store.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::retry::RetryPolicy;

// ── Default value functions ──────────────────────────────────────────

fn default_worker_count() -> usize {
    0
}

fn default_pairing_rules() -> Vec<PairingRuleConfig> {
    vec![
        PairingRuleConfig::new(r"(.*)\.c", "${1}.h"),
        PairingRuleConfig::new(r"src/(.*)_impl\.c", "include/${1}.h"),
    ]
}

fn default_exclude_patterns() -> Vec<String> {
    ["*.bak", "*.tmp", "__pycache__/*", "*.pyc", ".git/*", ".svn/*", "*.o", "*.obj"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_header_extensions() -> Vec<String> {
    [".h", ".hpp", ".hh", ".hxx"].iter().map(|s| s.to_string()).collect()
}

fn default_source_extensions() -> Vec<String> {
    [".c", ".cc", ".cpp", ".cxx"].iter().map(|s| s.to_string()).collect()
}

fn default_large_file_threshold() -> u64 {
    100 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    16 * 1024 * 1024
}

fn default_min_disk_space() -> u64 {
    1024 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_analysis_extensions() -> Vec<String> {
    [".c", ".cpp", ".cc", ".cxx", ".h", ".hpp", ".hxx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_skip_dirs() -> Vec<String> {
    ["build", ".git", "__pycache__", ".vscode"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_include_dirs() -> Vec<String> {
    [".", "include", "src"].iter().map(|s| s.to_string()).collect()
}

fn default_db_path() -> String {
    "./relation_analysis.db".to_string()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// One ordered pairing rule: a regex over the source file's relative path
/// and the replacement template producing the expected header path.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PairingRuleConfig {
    pub source_pattern: String,
    pub header_pattern: String,
}

impl PairingRuleConfig {
    pub fn new(source_pattern: &str, header_pattern: &str) -> Self {
        Self {
            source_pattern: source_pattern.to_string(),
            header_pattern: header_pattern.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreprocessConfig {
    /// Copy worker pool size (0 = available parallelism)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_pairing_rules")]
    pub pairing_rules: Vec<PairingRuleConfig>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_header_extensions")]
    pub header_extensions: Vec<String>,

    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Files strictly larger than this are copied in chunks
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_min_disk_space")]
    pub min_disk_space: u64,

    #[serde(default = "default_true")]
    pub show_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    /// Include search roots, relative to the project root, tried in order
    #[serde(default = "default_include_dirs")]
    pub include_dirs: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub reconnect: RetryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            pairing_rules: default_pairing_rules(),
            exclude_patterns: default_exclude_patterns(),
            header_extensions: default_header_extensions(),
            source_extensions: default_source_extensions(),
            large_file_threshold: default_large_file_threshold(),
            chunk_size: default_chunk_size(),
            min_disk_space: default_min_disk_space(),
            show_progress: default_true(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            extensions: default_analysis_extensions(),
            skip_dirs: default_skip_dirs(),
            include_dirs: default_include_dirs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            reconnect: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl PreprocessConfig {
    /// Worker pool size with `0` resolved to the machine's parallelism.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// Whether `ext` (with leading dot, any case) is a header extension.
    #[must_use]
    pub fn is_header_extension(&self, ext: &str) -> bool {
        contains_extension(&self.header_extensions, ext)
    }

    /// Whether `ext` (with leading dot, any case) is a source extension.
    #[must_use]
    pub fn is_source_extension(&self, ext: &str) -> bool {
        contains_extension(&self.source_extensions, ext)
    }
}

impl AnalysisConfig {
    #[must_use]
    pub fn is_analyzed_extension(&self, ext: &str) -> bool {
        contains_extension(&self.extensions, ext)
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            self.multiplier,
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

fn contains_extension(set: &[String], ext: &str) -> bool {
    !ext.is_empty() && set.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"cproject-graph.json"`.
    /// A missing file or invalid JSON yields the default configuration.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "cproject-graph.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// Pattern syntax is checked separately when the preprocessor compiles
    /// its rules.
    pub fn validate(&self) -> Result<()> {
        let p = &self.preprocess;
        anyhow::ensure!(p.chunk_size > 0, "preprocess.chunk_size must be positive");
        anyhow::ensure!(
            p.header_extensions
                .iter()
                .chain(&p.source_extensions)
                .all(|e| e.starts_with('.')),
            "extensions must start with '.'"
        );
        anyhow::ensure!(
            self.store.reconnect.multiplier >= 1.0,
            "store.reconnect.multiplier must be >= 1.0"
        );
        anyhow::ensure!(!self.store.db_path.is_empty(), "store.db_path must be set");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.preprocess.worker_count, 0);
        assert_eq!(config.preprocess.large_file_threshold, 100 * 1024 * 1024);
        assert_eq!(config.preprocess.chunk_size, 16 * 1024 * 1024);
        assert_eq!(config.preprocess.min_disk_space, 1024 * 1024 * 1024);
        assert_eq!(config.preprocess.pairing_rules.len(), 2);
        assert_eq!(config.analysis.include_dirs, vec![".", "include", "src"]);
        assert_eq!(config.store.reconnect.max_attempts, 1);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"preprocess": {"worker_count": 3, "chunk_size": 4096}, "store": {"db_path": "./x.db"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.preprocess.worker_count, 3);
        assert_eq!(config.preprocess.chunk_size, 4096);
        assert_eq!(config.store.db_path, "./x.db");
        // Other fields should have defaults
        assert_eq!(config.preprocess.header_extensions.len(), 4);
        assert_eq!(config.analysis.skip_dirs.len(), 4);
    }

    #[test]
    fn test_effective_worker_count() {
        let mut config = PreprocessConfig::default();
        assert!(config.effective_worker_count() >= 1);
        config.worker_count = 7;
        assert_eq!(config.effective_worker_count(), 7);
    }

    #[test]
    fn test_extension_membership_ignores_case() {
        let config = PreprocessConfig::default();
        assert!(config.is_header_extension(".H"));
        assert!(config.is_source_extension(".cpp"));
        assert!(!config.is_source_extension(".h"));
        assert!(!config.is_source_extension(""));
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.preprocess.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_extension_without_dot() {
        let mut config = Config::default();
        config.preprocess.header_extensions = vec!["h".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.store.db_path, default_db_path());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let mut config = Config::default();
        config.preprocess.worker_count = 2;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.preprocess.worker_count, 2);
        assert_eq!(loaded.preprocess.pairing_rules, config.preprocess.pairing_rules);
    }
}
