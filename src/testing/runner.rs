//! Test runner implementation
//!
//! Executes scenarios against the infrastructure tool and asserts on the
//! structured outputs it records, never on its human-readable log.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use colored::Colorize;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::tool::{Executor, Options, RetryableError, Tool};

use super::config::{Lifecycle, OutputAssertion, PlanConfig, TestScenario};
use super::teardown::Teardown;
use super::workspace::ScenarioWorkspace;

/// Lifecycle state a scenario reached
///
/// `Start → Initialized → Applied → Asserted → Destroyed`; plan and
/// validate scenarios stop at `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Start,
    Initialized,
    Applied,
    Asserted,
    Destroyed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Initialized => "initialized",
            Phase::Applied => "applied",
            Phase::Asserted => "asserted",
            Phase::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub phase: Phase,
    pub error: Option<String>,
    pub duration: Duration,
}

impl TestResult {
    /// A scenario that failed before the tool was ever invoked
    fn not_started(path: &Path, error: &Error) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            passed: false,
            phase: Phase::Start,
            error: Some(error.to_string()),
            duration: Duration::ZERO,
        }
    }
}

/// Settings shared by every scenario in a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub binary: PathBuf,
    pub max_retries: u32,
    pub time_between_retries: Duration,
    pub extra_errors: Vec<RetryableError>,
    pub command_timeout: Option<Duration>,
    pub jobs: usize,
    pub verbose: bool,
}

impl RunSettings {
    /// Build settings from the config file, locating the tool binary
    pub fn from_config(config: &Config, tool_override: Option<&Path>) -> Result<Self> {
        Ok(Self {
            binary: config.find_tool(tool_override)?,
            max_retries: config.retry.max_retries,
            time_between_retries: Duration::from_secs(config.retry.time_between_retries_secs),
            extra_errors: config.retry.extra_errors.clone(),
            command_timeout: config.run.command_timeout_secs.map(Duration::from_secs),
            jobs: config.run.jobs,
            verbose: false,
        })
    }

    /// Invocation options for one scenario in `working_dir`
    pub fn options_for(&self, scenario: &TestScenario, working_dir: &Path) -> Options {
        let mut opts = Options::new(&self.binary, working_dir).with_no_color(scenario.no_color);

        if scenario.retryable {
            opts = opts
                .with_default_retryable_errors()
                .with_retryable_errors(self.extra_errors.iter().cloned())
                .with_retry_policy(self.max_retries, self.time_between_retries);
        }
        if let Some(out) = scenario.plan.as_ref().and_then(|p| p.out.as_ref()) {
            opts = opts.with_plan_file(out);
        }
        if let Some(timeout) = self.command_timeout {
            opts = opts.with_command_timeout(timeout);
        }
        for (key, value) in &scenario.vars {
            opts = opts.with_var(key, value);
        }
        for (key, value) in &scenario.env {
            opts = opts.with_env(key, value);
        }
        opts
    }
}

/// Expand files and directories into a sorted list of scenario files
pub fn collect_scenarios(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut in_dir = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let file = entry?.path();
                let is_yaml = file
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml");
                if is_yaml && file.is_file() {
                    in_dir.push(file);
                }
            }
            in_dir.sort();
            found.extend(in_dir);
        } else if path.is_file() {
            found.push(path.clone());
        } else {
            return Err(Error::Config(format!(
                "Scenario path not found: '{}'",
                path.display()
            )));
        }
    }
    Ok(found)
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(path: &Path, settings: &RunSettings) -> Result<TestResult> {
    let scenario = TestScenario::load(path)?;
    let workspace = ScenarioWorkspace::prepare(&scenario.module_dir(path), scenario.isolate)?;
    let tool = Tool::new(settings.options_for(&scenario, workspace.dir()));

    if settings.verbose {
        println!(
            "\n{} {}",
            "Running Test:".blue().bold(),
            scenario.name.white().bold()
        );
        if let Some(desc) = &scenario.description {
            println!("  {}", desc.dimmed());
        }
        println!(
            "  {} {}",
            "Module:".dimmed(),
            workspace.dir().display().to_string().dimmed()
        );
    }

    Ok(execute(&scenario, &tool, settings.verbose).await)
}

/// Run many scenario files, at most `settings.jobs` at a time
///
/// Each scenario gets its own `Options` and workspace; a failure in one
/// never stops the others. Results are sorted by name.
pub async fn run_scenarios(paths: &[PathBuf], settings: &RunSettings) -> Vec<TestResult> {
    let mut results: Vec<TestResult> = stream::iter(paths)
        .map(|path| async move {
            match run_scenario(path, settings).await {
                Ok(result) => result,
                Err(e) => {
                    println!("{} {}: {}", "✗".red(), path.display(), e);
                    TestResult::not_started(path, &e)
                }
            }
        })
        .buffer_unordered(settings.jobs.max(1))
        .collect()
        .await;

    results.sort_by(|a, b| a.name.cmp(&b.name));
    results
}

/// Run one loaded scenario with an already configured tool
pub async fn execute<E: Executor>(scenario: &TestScenario, tool: &Tool<E>, verbose: bool) -> TestResult {
    let started = Instant::now();
    let mut phase = Phase::Start;

    let outcome = run_lifecycle(scenario, tool, &mut phase, verbose).await;
    let duration = started.elapsed();

    match outcome {
        Ok(()) => {
            tracing::info!(scenario = %scenario.name, %phase, ?duration, "Scenario passed");
            println!(
                "{} {} {}",
                "✓".green(),
                scenario.name,
                format!("({}, {:.1}s)", scenario.lifecycle, duration.as_secs_f64()).dimmed()
            );
            TestResult {
                name: scenario.name.clone(),
                passed: true,
                phase,
                error: None,
                duration,
            }
        }
        Err(e) => {
            tracing::info!(scenario = %scenario.name, %phase, "Scenario failed: {e}");
            println!(
                "{} {} {}: {}",
                "✗".red(),
                scenario.name,
                format!("(at {phase})").dimmed(),
                e
            );
            TestResult {
                name: scenario.name.clone(),
                passed: false,
                phase,
                error: Some(e.to_string()),
                duration,
            }
        }
    }
}

async fn run_lifecycle<E: Executor>(
    scenario: &TestScenario,
    tool: &Tool<E>,
    phase: &mut Phase,
    verbose: bool,
) -> Result<()> {
    tool.init().await?;
    advance(phase, Phase::Initialized, &scenario.name, "init", verbose);

    match scenario.lifecycle {
        Lifecycle::Validate => {
            tool.validate().await?;
            step_passed(&scenario.name, "validate", verbose);
            Ok(())
        }

        Lifecycle::Plan => {
            let default_plan = PlanConfig::default();
            let plan = scenario.plan.as_ref().unwrap_or(&default_plan);
            let code = tool.plan_exit_code().await?;
            if !plan.accept_exit_codes.contains(&code) {
                return Err(Error::TestAssertion(format!(
                    "plan exited with code {code}, expected one of {:?}",
                    plan.accept_exit_codes
                )));
            }
            step_passed(&scenario.name, &format!("plan (exit code {code})"), verbose);
            Ok(())
        }

        Lifecycle::Apply => {
            let teardown = Teardown::arm(tool);
            let applied = apply_and_assert(scenario, tool, phase, verbose).await;
            let destroyed = teardown.run().await;

            match (applied, destroyed) {
                (Ok(()), Ok(())) => {
                    advance(phase, Phase::Destroyed, &scenario.name, "destroy", verbose);
                    Ok(())
                }
                (Err(e), Ok(())) => {
                    advance(phase, Phase::Destroyed, &scenario.name, "destroy", verbose);
                    Err(e)
                }
                (Ok(()), Err(e)) => Err(e),
                (Err(e), Err(destroy_err)) => {
                    tracing::error!(
                        scenario = %scenario.name,
                        "Destroy after failure also failed, resources may be orphaned: {destroy_err}"
                    );
                    Err(e)
                }
            }
        }
    }
}

async fn apply_and_assert<E: Executor>(
    scenario: &TestScenario,
    tool: &Tool<E>,
    phase: &mut Phase,
    verbose: bool,
) -> Result<()> {
    tool.apply().await?;
    advance(phase, Phase::Applied, &scenario.name, "apply", verbose);

    for assertion in &scenario.expect {
        check_assertion(tool, assertion).await?;
        step_passed(
            &scenario.name,
            &format!("output '{}'", assertion.output_name()),
            verbose,
        );
    }
    *phase = Phase::Asserted;
    Ok(())
}

async fn check_assertion<E: Executor>(tool: &Tool<E>, assertion: &OutputAssertion) -> Result<()> {
    match assertion {
        OutputAssertion::OutputMap {
            name,
            not_empty,
            contains_keys,
        } => {
            let map = tool.output_map(name).await?;
            if *not_empty && map.is_empty() {
                return Err(Error::TestAssertion(format!(
                    "output '{name}' should not be empty"
                )));
            }
            for key in contains_keys {
                if !map.contains_key(key) {
                    let present: Vec<&str> = map.keys().map(String::as_str).collect();
                    return Err(Error::TestAssertion(format!(
                        "output '{name}' should contain key '{key}' (has: {})",
                        present.join(", ")
                    )));
                }
            }
            Ok(())
        }

        OutputAssertion::OutputJson { name, not_empty } => {
            let raw = tool.output_json(name).await?;
            if *not_empty && json_is_empty(&raw) {
                return Err(Error::TestAssertion(format!(
                    "output '{name}' should not be empty, got {raw}"
                )));
            }
            Ok(())
        }

        OutputAssertion::OutputEquals { name, key, value } => {
            let map = tool.output_map(name).await?;
            match map.get(key) {
                Some(actual) if actual == value => Ok(()),
                Some(actual) => Err(Error::TestAssertion(format!(
                    "output '{name}.{key}' expected '{value}', got '{actual}'"
                ))),
                None => Err(Error::TestAssertion(format!(
                    "output '{name}' has no key '{key}'"
                ))),
            }
        }
    }
}

/// Null, "", [] and {} count as empty
fn json_is_empty(raw: &str) -> bool {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => true,
        Ok(Value::String(s)) => s.is_empty(),
        Ok(Value::Array(items)) => items.is_empty(),
        Ok(Value::Object(fields)) => fields.is_empty(),
        Ok(_) => false,
        Err(_) => raw.trim().is_empty(),
    }
}

fn advance(phase: &mut Phase, next: Phase, scenario: &str, step: &str, verbose: bool) {
    *phase = next;
    tracing::debug!(scenario, %next, "Phase reached");
    step_passed(scenario, step, verbose);
}

fn step_passed(scenario: &str, step: &str, verbose: bool) {
    if verbose {
        println!("  {} {} {}", "✓".green(), scenario.dimmed(), step);
    }
}

/// Print a one-line summary of a run
pub fn print_summary(results: &[TestResult]) {
    let failed: Vec<&TestResult> = results.iter().filter(|r| !r.passed).collect();
    let passed = results.len() - failed.len();

    println!();
    if failed.is_empty() {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("{passed} passed").green().bold()
        );
        return;
    }

    println!("{}", "Failures:".red().bold());
    for result in &failed {
        println!(
            "  {} {} (at {}): {}",
            "✗".red(),
            result.name,
            result.phase,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!(
        "\n{} {}, {}",
        "✗".red().bold(),
        format!("{} failed", failed.len()).red().bold(),
        format!("{passed} passed").green()
    );
}
