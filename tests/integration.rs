//! End-to-end integration tests for terraprobe
//!
//! These tests verify the complete scenario lifecycle by:
//! 1. Copying a fixture module into a private temp directory
//! 2. Driving it with the `mock-terraform` binary
//! 3. Checking outputs, exit codes, the verbs that ran and the state left behind
//!
//! Every test owns its directory, so they run in parallel like the
//! scenarios themselves.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;
use terraprobe::testing::{self, Lifecycle, Phase, RunSettings, Teardown, TestScenario};
use terraprobe::{Error, Options, Tool};

/// Path to the mock tool binary built alongside the tests
fn mock_tool() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mock-terraform"))
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("scenarios")
}

/// Test context owning a private copy of one fixture module
struct TestContext {
    /// Temporary directory, removed on drop
    temp: TempDir,
}

impl TestContext {
    /// Copy `fixture` into a fresh temp directory
    fn new(fixture: &str) -> Self {
        let temp = tempfile::Builder::new()
            .prefix(&format!("terraprobe-{fixture}-"))
            .tempdir()
            .expect("Failed to create temp dir");

        let source = fixtures_dir().join(fixture);
        for entry in fs::read_dir(&source).expect("Failed to read fixture dir") {
            let entry = entry.expect("Failed to read fixture entry");
            fs::copy(entry.path(), temp.path().join(entry.file_name()))
                .expect("Failed to copy fixture file");
        }

        Self { temp }
    }

    fn dir(&self) -> &Path {
        self.temp.path()
    }

    /// Options for the mock tool in this context
    fn options(&self) -> Options {
        Options::new(mock_tool(), self.dir()).with_no_color(true)
    }

    fn tool(&self) -> Tool {
        Tool::new(self.options())
    }

    /// Verbs the mock tool has been invoked with, in order
    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir().join(".mock-calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Whether any provisioned state is left behind
    fn has_state(&self) -> bool {
        self.dir().join("terraform.tfstate").exists()
    }

    fn scenario(&self, yaml: &str) -> TestScenario {
        let scenario: TestScenario = serde_yaml::from_str(yaml).expect("Invalid scenario YAML");
        scenario
            .validate(&self.dir().join("scenario.yaml"))
            .expect("Scenario failed validation");
        scenario
    }
}

fn settings(binary: PathBuf) -> RunSettings {
    RunSettings {
        binary,
        max_retries: 3,
        time_between_retries: Duration::ZERO,
        extra_errors: Vec::new(),
        command_timeout: Some(Duration::from_secs(60)),
        jobs: 4,
        verbose: false,
    }
}

// ============== Library API ==============

#[tokio::test]
async fn test_basic_user_outputs() {
    let ctx = TestContext::new("basic");
    let tool = ctx.tool();

    tool.init_and_apply().await.unwrap();
    let user = tool.output_map("user").await.unwrap();
    tool.destroy().await.unwrap();

    assert!(!user.is_empty(), "User output should not be empty");
    assert_eq!(user["id"], "terraprobe-basic@pve");
    assert_eq!(user["username"], "terraprobe-basic");
    assert!(!ctx.has_state(), "Destroy should leave no state behind");
    assert_eq!(ctx.calls(), vec!["init", "apply", "output", "destroy"]);
}

#[tokio::test]
async fn test_multiple_users_json() {
    let ctx = TestContext::new("multiple_users");
    let tool = ctx.tool();

    tool.init_and_apply().await.unwrap();
    let raw = tool.output_json("users").await.unwrap();
    tool.destroy().await.unwrap();

    let users: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(users.as_object().map(|m| m.len()), Some(3));
    assert_eq!(users["terraprobe-bob"]["id"], "terraprobe-bob@pve");
}

#[tokio::test]
async fn test_plan_writes_plan_file() {
    let ctx = TestContext::new("basic");
    let tool = Tool::new(ctx.options().with_plan_file("./plan"));

    tool.init().await.unwrap();
    let code = tool.plan_exit_code().await.unwrap();

    assert!([0, 2].contains(&code), "Unexpected plan exit code {code}");
    assert_eq!(code, 2, "Fresh module should have changes pending");
    assert!(ctx.dir().join("plan").exists());
    assert!(!ctx.has_state(), "Plan must not provision anything");
}

#[tokio::test]
async fn test_plan_after_apply_is_idempotent() {
    let ctx = TestContext::new("basic");
    let tool = ctx.tool();

    tool.init_and_apply().await.unwrap();
    let code = tool.plan_exit_code().await.unwrap();
    tool.destroy().await.unwrap();

    assert_eq!(code, 0, "Plan against unchanged applied state should be empty");
}

#[tokio::test]
async fn test_validate() {
    let ctx = TestContext::new("basic");
    let tool = ctx.tool();

    tool.init().await.unwrap();
    tool.validate().await.unwrap();
}

#[tokio::test]
async fn test_validate_rejects_invalid_module() {
    let ctx = TestContext::new("invalid");
    let tool = ctx.tool();

    tool.init().await.unwrap();
    let err = tool.validate().await.unwrap_err();

    assert!(matches!(err, Error::CommandFailed { .. }));
    assert!(err.to_string().contains("Unsupported argument"));
}

#[tokio::test]
async fn test_transient_init_errors_are_retried() {
    let ctx = TestContext::new("flaky_init");
    let tool = Tool::new(
        ctx.options()
            .with_default_retryable_errors()
            .with_retry_policy(3, Duration::ZERO),
    );

    tool.init().await.unwrap();

    assert_eq!(ctx.calls(), vec!["init", "init", "init"]);
}

#[tokio::test]
async fn test_transient_init_errors_fail_without_retries() {
    let ctx = TestContext::new("flaky_init");

    let err = ctx.tool().init().await.unwrap_err();

    assert!(err.to_string().contains("Error installing provider"));
    assert_eq!(ctx.calls(), vec!["init"]);
}

#[tokio::test]
async fn test_missing_output() {
    let ctx = TestContext::new("basic");
    let tool = ctx.tool();

    tool.init_and_apply().await.unwrap();
    let err = tool.output_map("does_not_exist").await.unwrap_err();
    tool.destroy().await.unwrap();

    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_version() {
    let ctx = TestContext::new("basic");
    let version = ctx.tool().version().await.unwrap();
    assert_eq!(version, semver::Version::new(1, 9, 8));
}

// ============== Guaranteed cleanup ==============

#[tokio::test]
async fn test_failed_apply_is_destroyed() {
    let ctx = TestContext::new("failing_apply");
    let scenario = ctx.scenario(
        r#"
name: failing-apply
module: .
lifecycle: apply
expect:
  - { type: output_map, name: user, not_empty: true }
"#,
    );

    let result = testing::execute(&scenario, &ctx.tool(), false).await;

    assert!(!result.passed);
    assert!(result.error.unwrap().contains("500"));
    assert_eq!(result.phase, Phase::Destroyed);
    assert_eq!(ctx.calls(), vec!["init", "apply", "destroy"]);
    assert!(!ctx.has_state(), "Partial state should have been destroyed");
}

#[tokio::test]
async fn test_failed_assertion_is_destroyed() {
    let ctx = TestContext::new("basic");
    let scenario = ctx.scenario(
        r#"
name: wrong-keys
module: .
lifecycle: apply
expect:
  - { type: output_map, name: user, contains_keys: [id, password] }
"#,
    );

    let result = testing::execute(&scenario, &ctx.tool(), false).await;

    assert!(!result.passed);
    assert!(result.error.unwrap().contains("should contain key 'password'"));
    assert_eq!(ctx.calls(), vec!["init", "apply", "output", "destroy"]);
    assert!(!ctx.has_state());
}

#[tokio::test]
async fn test_dropped_teardown_destroys() {
    let ctx = TestContext::new("basic");
    let tool = ctx.tool();

    tool.init_and_apply().await.unwrap();
    assert!(ctx.has_state());

    drop(Teardown::arm(&tool));

    assert!(!ctx.has_state(), "Drop fallback should have destroyed");
}

// ============== Scenario files ==============

#[tokio::test]
async fn test_scenario_files_load() {
    let paths = testing::collect_scenarios(&[scenarios_dir()]).unwrap();
    assert_eq!(paths.len(), 4);

    let lifecycles: Vec<Lifecycle> = paths
        .iter()
        .map(|p| TestScenario::load(p).unwrap().lifecycle)
        .collect();
    assert!(lifecycles.contains(&Lifecycle::Apply));
    assert!(lifecycles.contains(&Lifecycle::Plan));
    assert!(lifecycles.contains(&Lifecycle::Validate));
}

#[tokio::test]
async fn test_run_all_scenarios_in_parallel() {
    let paths = testing::collect_scenarios(&[scenarios_dir()]).unwrap();

    let results = testing::run_scenarios(&paths, &settings(mock_tool())).await;

    assert_eq!(results.len(), 4);
    for result in &results {
        assert!(result.passed, "{} failed: {:?}", result.name, result.error);
    }
    let basic = results
        .iter()
        .find(|r| r.name == "proxmox-user-basic")
        .unwrap();
    assert_eq!(basic.phase, Phase::Destroyed);
}

#[tokio::test]
async fn test_isolated_scenario_leaves_fixture_untouched() {
    let path = scenarios_dir().join("basic.yaml");

    let result = testing::run_scenario(&path, &settings(mock_tool()))
        .await
        .unwrap();

    assert!(result.passed, "{:?}", result.error);
    let fixture = fixtures_dir().join("basic");
    assert!(!fixture.join(".terraform").exists());
    assert!(!fixture.join("terraform.tfstate").exists());
    assert!(!fixture.join(".mock-calls").exists());
}

#[tokio::test]
async fn test_broken_scenario_file_does_not_stop_others() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.yaml"), "name: broken\nlifecycle: apply\n").unwrap();
    let paths = vec![
        dir.path().join("broken.yaml"),
        scenarios_dir().join("validation.yaml"),
    ];

    let results = testing::run_scenarios(&paths, &settings(mock_tool())).await;

    assert_eq!(results.len(), 2);
    let broken = results.iter().find(|r| r.name == "broken").unwrap();
    assert!(!broken.passed);
    assert_eq!(broken.phase, Phase::Start);
    let validation = results
        .iter()
        .find(|r| r.name == "proxmox-user-validation")
        .unwrap();
    assert!(validation.passed, "{:?}", validation.error);
}

// ============== CLI ==============

/// Write a config file that keeps retries fast
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(
        &path,
        "[retry]\nmax_retries = 3\ntime_between_retries_secs = 0\n\n[run]\njobs = 4\n",
    )
    .unwrap();
    path
}

fn terraprobe(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_terraprobe"))
        .args(args)
        .output()
        .expect("Failed to run terraprobe")
}

#[test]
fn test_cli_runs_scenario_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let tool = mock_tool();
    let scenarios = scenarios_dir();

    let output = terraprobe(&[
        "test",
        scenarios.to_str().unwrap(),
        "--tool",
        tool.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--jobs",
        "4",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "terraprobe test failed:\nstdout: {}\nstderr: {}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("4 passed"), "Unexpected summary: {stdout}");
}

#[test]
fn test_cli_relative_tool_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let tool = mock_tool();
    let tool_dir = tool.parent().unwrap();
    let tool_name = tool.file_name().unwrap().to_str().unwrap();
    let scenario = scenarios_dir().join("validation.yaml");

    // Relative to the invoking directory, not to the module the tool runs in
    let output = Command::new(env!("CARGO_BIN_EXE_terraprobe"))
        .current_dir(tool_dir)
        .args([
            "test",
            scenario.to_str().unwrap(),
            "--tool",
            tool_name,
            "--config",
            config.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to run terraprobe");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "terraprobe test failed:\nstdout: {}\nstderr: {}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("1 passed"), "Unexpected summary: {stdout}");
}

#[test]
fn test_cli_zero_jobs_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let tool = mock_tool();
    let scenarios = scenarios_dir();

    let output = terraprobe(&[
        "test",
        scenarios.to_str().unwrap(),
        "--tool",
        tool.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--jobs",
        "0",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--jobs must be at least 1"), "stderr: {stderr}");
}

#[test]
fn test_cli_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let module = fixtures_dir().join("invalid");
    let scenario = dir.path().join("invalid.yaml");
    fs::write(
        &scenario,
        format!(
            "name: invalid\nmodule: {}\nlifecycle: validate\nisolate: true\n",
            module.display()
        ),
    )
    .unwrap();
    let tool = mock_tool();

    let output = terraprobe(&[
        "test",
        scenario.to_str().unwrap(),
        "--tool",
        tool.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 1 scenarios failed"), "stderr: {stderr}");
}

#[test]
fn test_cli_list() {
    let scenarios = scenarios_dir();
    let output = terraprobe(&["list", scenarios.to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("proxmox-user-basic"));
    assert!(stdout.contains("[plan]"));
}

#[test]
fn test_cli_check_with_mock_tool() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let tool = mock_tool();

    let output = terraprobe(&[
        "check",
        "--tool",
        tool.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("1.9.8"));
}

#[test]
fn test_cli_check_missing_tool() {
    let output = terraprobe(&["check", "--tool", "/nonexistent/terraform"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}
