//! Invocation configuration for one scenario
//!
//! `Options` is built once per scenario and never mutated afterwards; each
//! `with_*` method consumes the value and returns a new one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::exec::Invocation;
use super::retry::{default_retryable_errors, RetryableError};

/// Retries after the first attempt when retryable errors are enabled
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pause between attempts when retryable errors are enabled
pub const DEFAULT_TIME_BETWEEN_RETRIES: Duration = Duration::from_secs(5);

/// Everything needed to invoke the tool against one module directory
#[derive(Debug, Clone)]
pub struct Options {
    binary: PathBuf,
    working_dir: PathBuf,
    no_color: bool,
    plan_file_path: Option<PathBuf>,
    vars: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
    retryable_errors: Vec<RetryableError>,
    max_retries: u32,
    time_between_retries: Duration,
    command_timeout: Option<Duration>,
}

impl Options {
    /// Options for `binary` run inside `working_dir`, with no retries
    pub fn new(binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            no_color: false,
            plan_file_path: None,
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
            retryable_errors: Vec::new(),
            max_retries: 0,
            time_between_retries: Duration::ZERO,
            command_timeout: None,
        }
    }

    /// Pass `-no-color` to every verb that accepts it
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Write the computed plan to this path (relative to the working dir)
    pub fn with_plan_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_file_path = Some(path.into());
        self
    }

    /// Set an input variable passed as `-var key=value`
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set an environment variable for every invocation
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Enable the built-in transient error table with the default retry policy
    pub fn with_default_retryable_errors(mut self) -> Self {
        self.retryable_errors = default_retryable_errors();
        self.max_retries = DEFAULT_MAX_RETRIES;
        self.time_between_retries = DEFAULT_TIME_BETWEEN_RETRIES;
        self
    }

    /// Add extra transient error fragments
    pub fn with_retryable_errors(mut self, errors: impl IntoIterator<Item = RetryableError>) -> Self {
        self.retryable_errors.extend(errors);
        self
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, max_retries: u32, time_between_retries: Duration) -> Self {
        self.max_retries = max_retries;
        self.time_between_retries = time_between_retries;
        self
    }

    /// Kill any single invocation that runs longer than `timeout`
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn no_color(&self) -> bool {
        self.no_color
    }

    pub fn plan_file_path(&self) -> Option<&Path> {
        self.plan_file_path.as_deref()
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn retryable_errors(&self) -> &[RetryableError] {
        &self.retryable_errors
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn time_between_retries(&self) -> Duration {
        self.time_between_retries
    }

    /// Build the process invocation for one verb
    pub fn invocation(&self, args: Vec<String>) -> Invocation {
        let mut env = vec![("TF_IN_AUTOMATION".to_string(), "1".to_string())];
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Invocation {
            program: self.binary.clone(),
            args,
            working_dir: self.working_dir.clone(),
            env,
            timeout: self.command_timeout,
        }
    }
}
