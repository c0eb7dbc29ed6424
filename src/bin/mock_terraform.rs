//! Mock infrastructure tool for integration testing
//!
//! Accepts the same lifecycle verbs as Terraform (init, validate, plan,
//! apply, destroy, output, version) and fakes them against a `mock.json`
//! file in the working directory, so the runner can be tested without a
//! real provider or cloud endpoint.
//!
//! `mock.json` fields:
//! - `outputs`: output values recorded by a successful apply
//! - `valid`: whether `validate` succeeds (default true)
//! - `fail_apply`: make apply fail after creating part of the state
//! - `transient_init_failures`: fail init this many times with a
//!   retryable provider-install error before succeeding
//!
//! Every invocation appends its verb to `.mock-calls` and state lives in
//! `terraform.tfstate`, so tests can check what ran and what was left.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

const FIXTURE: &str = "mock.json";
const STATE: &str = "terraform.tfstate";
const CALLS: &str = ".mock-calls";
const INIT_ATTEMPTS: &str = ".mock-init-attempts";
const PLUGIN_DIR: &str = ".terraform";

#[derive(Deserialize, Default)]
struct Fixture {
    #[serde(default)]
    outputs: Map<String, Value>,
    #[serde(default = "default_true")]
    valid: bool,
    #[serde(default)]
    fail_apply: bool,
    #[serde(default)]
    transient_init_failures: u32,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Default, PartialEq)]
struct State {
    outputs: Map<String, Value>,
    complete: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(verb) = args.first().cloned() else {
        eprintln!("Usage: mock-terraform <command> [args]");
        return ExitCode::from(127);
    };

    record_call(&verb);

    let result = match verb.as_str() {
        "version" => version(),
        "init" => init(),
        "validate" => validate(),
        "plan" => plan(&args[1..]),
        "apply" => apply(),
        "destroy" => destroy(),
        "output" => output(&args[1..]),
        other => Err(format!("Error: unknown command \"{other}\"")),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

type Outcome = Result<u8, String>;

fn record_call(verb: &str) {
    let mut calls = fs::read_to_string(CALLS).unwrap_or_default();
    calls.push_str(verb);
    calls.push('\n');
    let _ = fs::write(CALLS, calls);
}

fn load_fixture() -> Result<Fixture, String> {
    let content = fs::read_to_string(FIXTURE)
        .map_err(|_| "Error: No configuration files\n\nApply requires configuration to be present.".to_string())?;
    serde_json::from_str(&content).map_err(|e| format!("Error: Invalid mock fixture: {e}"))
}

fn load_state() -> Option<State> {
    let content = fs::read_to_string(STATE).ok()?;
    serde_json::from_str(&content).ok()
}

fn save_state(state: &State) -> Result<(), String> {
    let content = serde_json::to_string_pretty(state).map_err(|e| e.to_string())?;
    fs::write(STATE, content).map_err(|e| format!("Error: Failed to persist state: {e}"))
}

fn require_init() -> Result<(), String> {
    if Path::new(PLUGIN_DIR).is_dir() {
        Ok(())
    } else {
        Err("Error: Inconsistent dependency lock file\n\nPlease run \"terraform init\".".to_string())
    }
}

fn version() -> Outcome {
    let info = json!({
        "terraform_version": "1.9.8",
        "platform": "linux_amd64",
        "provider_selections": {},
        "terraform_outdated": false
    });
    println!("{info}");
    Ok(0)
}

fn init() -> Outcome {
    let fixture = load_fixture()?;

    let attempts: u32 = fs::read_to_string(INIT_ATTEMPTS)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    if attempts < fixture.transient_init_failures {
        let _ = fs::write(INIT_ATTEMPTS, (attempts + 1).to_string());
        return Err(
            "Error: Failed to install provider\n\nError installing provider \"bpg/proxmox\": \
             read tcp 10.0.0.4:51234->140.82.121.4:443: read: connection reset by peer"
                .to_string(),
        );
    }

    fs::create_dir_all(PLUGIN_DIR).map_err(|e| e.to_string())?;
    println!("Terraform has been successfully initialized!");
    Ok(0)
}

fn validate() -> Outcome {
    require_init()?;
    let fixture = load_fixture()?;
    if !fixture.valid {
        return Err(
            "Error: Unsupported argument\n\n  on main.tf line 9, in resource \
             \"proxmox_virtual_environment_user\" \"this\":\n   9:   passwd = var.password"
                .to_string(),
        );
    }
    println!("Success! The configuration is valid.");
    Ok(0)
}

fn plan(args: &[String]) -> Outcome {
    require_init()?;
    let fixture = load_fixture()?;
    let detailed = args.iter().any(|a| a == "-detailed-exitcode");

    let desired = State {
        outputs: fixture.outputs.clone(),
        complete: true,
    };
    let unchanged = load_state().is_some_and(|s| s == desired);

    if let Some(out) = args.iter().find_map(|a| a.strip_prefix("-out=")) {
        let planned = json!({ "planned_outputs": fixture.outputs });
        fs::write(out, planned.to_string()).map_err(|e| format!("Error: Failed to write plan file: {e}"))?;
    }

    if unchanged {
        println!("No changes. Your infrastructure matches the configuration.");
        return Ok(0);
    }

    let count = fixture.outputs.len().max(1);
    println!("Plan: {count} to add, 0 to change, 0 to destroy.");
    Ok(if detailed { 2 } else { 0 })
}

fn apply() -> Outcome {
    require_init()?;
    let fixture = load_fixture()?;

    if fixture.fail_apply {
        save_state(&State {
            outputs: Map::new(),
            complete: false,
        })?;
        return Err(
            "Error: error creating user: received an HTTP 500 response - Reason: \
             Internal Server Error"
                .to_string(),
        );
    }

    let count = fixture.outputs.len();
    save_state(&State {
        outputs: fixture.outputs,
        complete: true,
    })?;
    println!("Apply complete! Resources: {count} added, 0 changed, 0 destroyed.");
    Ok(0)
}

fn destroy() -> Outcome {
    require_init()?;
    if Path::new(STATE).exists() {
        fs::remove_file(STATE).map_err(|e| format!("Error: Failed to remove state: {e}"))?;
    }
    println!("Destroy complete! Resources destroyed.");
    Ok(0)
}

/// `output -no-color -json <name>`
fn output(args: &[String]) -> Outcome {
    let Some(name) = args.iter().rev().find(|a| !a.starts_with('-')) else {
        return Err("Error: mock-terraform only supports reading a single named output".to_string());
    };

    let value = load_state()
        .and_then(|mut state| state.outputs.remove(name))
        .ok_or_else(|| {
            format!(
                "Error: Output \"{name}\" not found\n\nThe output variable requested could not be \
                 found in the state file."
            )
        })?;

    println!("{value}");
    Ok(0)
}
