//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};
use crate::tool::{PLAN_CHANGES_PENDING, PLAN_NO_CHANGES};

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Module directory, relative to the scenario file
    pub module: PathBuf,
    /// Which lifecycle path to run after `init`
    pub lifecycle: Lifecycle,
    /// Pass `-no-color` to the tool
    #[serde(default = "default_true")]
    pub no_color: bool,
    /// Retry the tool's known transient errors
    #[serde(default)]
    pub retryable: bool,
    /// Run against a private copy of the module directory
    #[serde(default)]
    pub isolate: bool,
    /// Input variables passed as `-var`
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Extra environment for every tool invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Plan settings (plan lifecycle only)
    pub plan: Option<PlanConfig>,
    /// Output assertions checked after apply (apply lifecycle only)
    #[serde(default)]
    pub expect: Vec<OutputAssertion>,
}

fn default_true() -> bool {
    true
}

/// Lifecycle path taken after `init`
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// apply, assert outputs, always destroy
    Apply,
    /// plan with a detailed exit code; nothing is provisioned
    Plan,
    /// validate only; nothing is provisioned
    Validate,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifecycle::Apply => "apply",
            Lifecycle::Plan => "plan",
            Lifecycle::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// Plan settings
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    /// Where the tool writes the computed plan, relative to the module
    pub out: Option<PathBuf>,
    /// Exit codes that pass the scenario
    #[serde(default = "default_accept_exit_codes")]
    pub accept_exit_codes: Vec<i32>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            out: None,
            accept_exit_codes: default_accept_exit_codes(),
        }
    }
}

fn default_accept_exit_codes() -> Vec<i32> {
    vec![PLAN_NO_CHANGES, PLAN_CHANGES_PENDING]
}

/// An assertion on an output read after apply
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputAssertion {
    /// Read the output as a map
    OutputMap {
        /// Output name
        name: String,
        /// The map must have at least one key
        #[serde(default)]
        not_empty: bool,
        /// Keys that must be present
        #[serde(default)]
        contains_keys: Vec<String>,
    },
    /// Read the output as raw JSON
    OutputJson {
        /// Output name
        name: String,
        /// The value must not be null, "", [] or {}
        #[serde(default)]
        not_empty: bool,
    },
    /// Compare one key of a map output
    OutputEquals {
        /// Output name
        name: String,
        /// Key inside the map
        key: String,
        /// Expected value (exact match)
        value: String,
    },
}

impl OutputAssertion {
    pub fn output_name(&self) -> &str {
        match self {
            OutputAssertion::OutputMap { name, .. }
            | OutputAssertion::OutputJson { name, .. }
            | OutputAssertion::OutputEquals { name, .. } => name,
        }
    }
}

impl TestScenario {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let scenario: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::scenario(path, format!("failed to parse: {e}")))?;
        scenario.validate(path)?;
        Ok(scenario)
    }

    /// Reject settings that have no effect for the chosen lifecycle
    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::scenario(path, "name must not be empty"));
        }
        if self.lifecycle != Lifecycle::Apply && !self.expect.is_empty() {
            return Err(Error::scenario(
                path,
                format!(
                    "'expect' needs lifecycle 'apply', but lifecycle is '{}'",
                    self.lifecycle
                ),
            ));
        }
        if self.lifecycle != Lifecycle::Plan && self.plan.is_some() {
            return Err(Error::scenario(
                path,
                format!(
                    "'plan' needs lifecycle 'plan', but lifecycle is '{}'",
                    self.lifecycle
                ),
            ));
        }
        if let Some(plan) = &self.plan {
            if plan.accept_exit_codes.is_empty() {
                return Err(Error::scenario(path, "'plan.accept_exit_codes' is empty"));
            }
            if let Some(code) = plan
                .accept_exit_codes
                .iter()
                .find(|c| ![PLAN_NO_CHANGES, PLAN_CHANGES_PENDING].contains(*c))
            {
                return Err(Error::scenario(
                    path,
                    format!(
                        "'plan.accept_exit_codes' may only contain {PLAN_NO_CHANGES} and \
                         {PLAN_CHANGES_PENDING}, got {code}"
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Module directory resolved against the scenario file's directory
    pub fn module_dir(&self, scenario_path: &Path) -> PathBuf {
        if self.module.is_relative() {
            scenario_path
                .parent()
                .unwrap_or(Path::new("."))
                .join(&self.module)
        } else {
            self.module.clone()
        }
    }
}
