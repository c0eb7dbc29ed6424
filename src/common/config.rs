//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};
use crate::tool::RetryableError;

/// Tool names tried on `PATH` when none is configured
pub const DEFAULT_TOOLS: &[&str] = &["terraform", "tofu"];

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Infrastructure tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Retry settings for transient tool errors
    #[serde(default)]
    pub retry: RetryConfig,

    /// Scenario run settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Infrastructure tool settings
#[derive(Debug, Deserialize, Default)]
pub struct ToolConfig {
    /// Binary name or path; `terraform` then `tofu` on `PATH` when unset
    pub binary: Option<PathBuf>,
}

/// Retry settings
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt for known transient errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts
    #[serde(default = "default_time_between_retries")]
    pub time_between_retries_secs: u64,

    /// Extra fragments treated as transient, on top of the built-in table
    #[serde(default)]
    pub extra_errors: Vec<RetryableError>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            time_between_retries_secs: default_time_between_retries(),
            extra_errors: Vec::new(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_time_between_retries() -> u64 {
    5
}

/// Scenario run settings
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Scenarios run concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Kill a single tool invocation after this many seconds
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            command_timeout_secs: None,
        }
    }
}

fn default_jobs() -> usize {
    4
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        if config.run.jobs == 0 {
            return Err(Error::ConfigParse("run.jobs must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Locate the infrastructure tool binary
    ///
    /// An explicit override wins over the config file; otherwise the
    /// default tool names are searched on `PATH`.
    pub fn find_tool(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(binary) = override_path.or(self.tool.binary.as_deref()) {
            // Scenarios run with the module as working directory, so a
            // relative path must be pinned to ours first.
            if binary.is_file() {
                return Ok(std::fs::canonicalize(binary)?);
            }
            return which::which(binary).map_err(|_| {
                Error::tool_not_found(&binary.display().to_string(), &["PATH"])
            });
        }

        DEFAULT_TOOLS
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| Error::tool_not_found(DEFAULT_TOOLS[0], DEFAULT_TOOLS))
    }
}
