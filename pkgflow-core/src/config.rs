//! Pipeline configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration. Command-line flags are applied on top by the binary.

use crate::executor::{EngineConfig, Phase};
use crate::log_parser::ParserConfig;
use crate::selection::{Selection, SelectionError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),

    #[error("Invalid pattern in '{field}': {source}")]
    Pattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// External toolchain command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub program: String,
    /// Arguments placed before the verb
    pub args: Vec<String>,
    /// Environment variable that points the toolchain at the library
    pub library_env: Option<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "R".to_string(),
            args: vec!["CMD".to_string()],
            library_env: Some("R_LIBS".to_string()),
        }
    }
}

/// Settings for a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of downloads, logs, results and check directories
    pub work_dir: PathBuf,
    /// Install target, `<work_dir>/library` when unset
    pub library_dir: Option<PathBuf>,
    pub download_jobs: usize,
    pub install_jobs: usize,
    pub check_jobs: usize,
    pub idle_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Check-phase progress interval, 0 disables the sampler
    pub progress_interval_secs: u64,
    pub toolchain: ToolchainConfig,
    pub install_options: Vec<String>,
    pub check_options: Vec<String>,
    /// Selection expression for the check phase
    pub check_selection: String,
    /// Check everything when the selection expression is empty
    pub check_all: bool,
    /// NOTE/WARNING findings matching this regex fail the check
    pub fail_on: Option<String>,
    /// Emit the final finding of a check log
    pub flush_trailing_finding: bool,
    /// Escape per-package logs and wrap them in `<pre>`
    pub html_logs: bool,
    /// Repository URLs by name, used when the lockfile declares none
    pub repositories: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("pkgflow-work"),
            library_dir: None,
            download_jobs: 8,
            install_jobs: 1,
            check_jobs: num_cpus::get(),
            idle_timeout_secs: 3600,
            poll_interval_ms: 1000,
            progress_interval_secs: 60,
            toolchain: ToolchainConfig::default(),
            install_options: Vec::new(),
            check_options: Vec::new(),
            check_selection: String::new(),
            check_all: false,
            fail_on: None,
            flush_trailing_finding: false,
            html_logs: false,
            repositories: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Load a YAML configuration file
    pub fn from_yaml_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse YAML configuration text
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("download_jobs", self.download_jobs),
            ("install_jobs", self.install_jobs),
            ("check_jobs", self.check_jobs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be at least 1".to_string()));
        }
        if self.toolchain.program.trim().is_empty() {
            return Err(ConfigError::Invalid("toolchain.program is empty".to_string()));
        }
        self.fail_on_regex()?;
        self.selection()?;
        Ok(())
    }

    /// Resolve `work_dir` and `library_dir` against the current directory
    ///
    /// Check jobs run inside per-package directories, so every path handed
    /// to the toolchain must not depend on the working directory.
    pub fn absolutize(&mut self) -> ConfigResult<()> {
        self.work_dir = absolute(&self.work_dir)?;
        if let Some(dir) = &self.library_dir {
            self.library_dir = Some(absolute(dir)?);
        }
        Ok(())
    }

    /// Compiled fail-override pattern
    pub fn fail_on_regex(&self) -> ConfigResult<Option<Regex>> {
        self.fail_on
            .as_deref()
            .map(|p| Regex::new(p).map_err(|source| ConfigError::Pattern { field: "fail_on", source }))
            .transpose()
    }

    /// Parser settings for check output
    pub fn parser_config(&self) -> ConfigResult<ParserConfig> {
        Ok(ParserConfig {
            fail_on: self.fail_on_regex()?,
            flush_trailing: self.flush_trailing_finding,
            ..ParserConfig::default()
        })
    }

    /// Compiled check selection
    pub fn selection(&self) -> ConfigResult<Selection> {
        Ok(Selection::parse(&self.check_selection, self.check_all)?)
    }

    /// Engine settings for a phase
    pub fn engine_config(&self, phase: Phase) -> EngineConfig {
        let concurrency = match phase {
            Phase::Download => self.download_jobs,
            Phase::Install => self.install_jobs,
            Phase::Check => self.check_jobs,
        };
        let config = EngineConfig::new(phase, concurrency)
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms));

        if phase == Phase::Check && self.progress_interval_secs > 0 {
            config.with_progress_interval(Duration::from_secs(self.progress_interval_secs))
        } else {
            config
        }
    }

    pub fn library_dir(&self) -> PathBuf {
        self.library_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.join("library"))
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.work_dir.join("downloads")
    }

    pub fn checks_dir(&self) -> PathBuf {
        self.work_dir.join("check")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }

    /// Result file of a phase
    pub fn results_path(&self, phase: Phase) -> PathBuf {
        self.work_dir.join("results").join(format!("{phase}.json"))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.work_dir.join("summary.json")
    }
}

fn absolute(path: &Path) -> ConfigResult<PathBuf> {
    std::path::absolute(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
