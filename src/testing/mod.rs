//! Scenario runner
//!
//! Reads YAML scenarios, drives the infrastructure tool through one
//! lifecycle path per scenario and asserts on the structured outputs.
//! Anything that was applied is destroyed again, whatever happened.

mod config;
mod runner;
mod teardown;
mod workspace;

pub use config::*;
pub use runner::{
    collect_scenarios, execute, print_summary, run_scenario, run_scenarios, Phase, RunSettings,
    TestResult,
};
pub use teardown::Teardown;
pub use workspace::ScenarioWorkspace;
