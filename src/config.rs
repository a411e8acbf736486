// src/config.rs
use crate::error::{HarnessError, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_OUTPUT_DIR: &str = "reports";
pub const CONFIG_FILE: &str = "costprobe.toml";

/// Harness configuration. Defaults live here; `costprobe.toml` and CLI flags
/// layer on top (file first, then flags).
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the fixture corpus tree.
    pub corpus_root: PathBuf,
    /// Analyzer command template, e.g. `"costwatch analyze"`. The fixture
    /// path is appended as the final argument on each invocation.
    pub analyzer_cmd: String,
    /// Extra `--format <fmt>` flag passed to the analyzer, if any.
    pub analyzer_format: Option<String>,
    /// Per-invocation wall-clock bound.
    pub timeout: Duration,
    /// Parallel invoker tasks. Defaults to available processor count.
    pub concurrency: usize,
    /// Categories below this detection rate get roadmap entries.
    pub alert_threshold: f64,
    /// Directory for run artifacts (summary JSON + narrative report).
    pub output_dir: PathBuf,
    pub verbose: bool,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self {
            corpus_root: PathBuf::from("fixtures"),
            analyzer_cmd: String::from("costwatch analyze"),
            analyzer_format: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: default_concurrency(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            verbose: false,
        }
    }

    /// Creates a config with local `costprobe.toml` settings applied, if the
    /// file exists in the working directory.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::new();
        config.load_local_config();
        config
    }

    pub fn load_local_config(&mut self) {
        if let Ok(content) = fs::read_to_string(CONFIG_FILE) {
            self.parse_toml(&content);
        }
    }

    /// Applies settings from a TOML document. Unknown keys are ignored;
    /// a malformed document leaves the config untouched.
    pub fn parse_toml(&mut self, content: &str) {
        let Ok(file) = toml::from_str::<ConfigFile>(content) else {
            return;
        };
        let Some(harness) = file.harness else {
            return;
        };
        if let Some(root) = harness.corpus_root {
            self.corpus_root = PathBuf::from(root);
        }
        if let Some(cmd) = harness.analyzer_cmd {
            self.analyzer_cmd = cmd;
        }
        if let Some(fmt) = harness.analyzer_format {
            self.analyzer_format = Some(fmt);
        }
        if let Some(secs) = harness.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = harness.concurrency {
            self.concurrency = n.max(1);
        }
        if let Some(t) = harness.alert_threshold {
            self.alert_threshold = t;
        }
        if let Some(dir) = harness.output_dir {
            self.output_dir = PathBuf::from(dir);
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error for an empty analyzer command or a threshold outside
    /// [0, 1].
    pub fn validate(&self) -> Result<()> {
        if self.analyzer_cmd.trim().is_empty() {
            return Err(HarnessError::CommandTemplate(
                "analyzer command is empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(HarnessError::CommandTemplate(format!(
                "alert threshold {} is outside [0, 1]",
                self.alert_threshold
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    harness: Option<HarnessSection>,
}

#[derive(Debug, Deserialize)]
struct HarnessSection {
    corpus_root: Option<String>,
    analyzer_cmd: Option<String>,
    analyzer_format: Option<String>,
    timeout_secs: Option<u64>,
    concurrency: Option<usize>,
    alert_threshold: Option<f64>,
    output_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::new();
        assert_eq!(c.timeout, Duration::from_secs(30));
        assert!((c.alert_threshold - 0.5).abs() < f64::EPSILON);
        assert!(c.concurrency >= 1);
        assert_eq!(c.output_dir, PathBuf::from("reports"));
    }

    #[test]
    fn toml_overrides() {
        let mut c = Config::new();
        c.parse_toml(
            "[harness]\ncorpus_root = \"corpus\"\ntimeout_secs = 5\nconcurrency = 2\nalert_threshold = 0.75",
        );
        assert_eq!(c.corpus_root, PathBuf::from("corpus"));
        assert_eq!(c.timeout, Duration::from_secs(5));
        assert_eq!(c.concurrency, 2);
        assert!((c.alert_threshold - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_toml_keeps_defaults() {
        let mut c = Config::new();
        c.parse_toml("not [valid toml ===");
        assert_eq!(c.timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_concurrency_clamped_to_one() {
        let mut c = Config::new();
        c.parse_toml("[harness]\nconcurrency = 0");
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn validate_rejects_empty_command() {
        let mut c = Config::new();
        c.analyzer_cmd = "  ".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_threshold() {
        let mut c = Config::new();
        c.alert_threshold = 1.5;
        assert!(c.validate().is_err());
    }
}
