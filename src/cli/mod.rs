//! CLI command handling
//!
//! Dispatches CLI commands and formats their output.

use std::path::Path;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::testing::{self, RunSettings, TestScenario};
use crate::tool::{Options, Tool};

/// Oldest tool release whose `output -json` and `version -json` we parse
const MIN_TOOL_VERSION: semver::Version = semver::Version::new(1, 0, 0);

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Test {
            paths,
            verbose,
            jobs,
            tool,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut settings = RunSettings::from_config(&config, tool.as_deref())?;
            settings.verbose = verbose;
            if let Some(jobs) = jobs {
                if jobs == 0 {
                    return Err(Error::Config("--jobs must be at least 1".to_string()));
                }
                settings.jobs = jobs;
            }

            let scenarios = testing::collect_scenarios(&paths)?;
            if scenarios.is_empty() {
                return Err(Error::Config("No scenario files found".to_string()));
            }

            tracing::info!(
                tool = %settings.binary.display(),
                scenarios = scenarios.len(),
                jobs = settings.jobs,
                "Starting run"
            );

            let results = testing::run_scenarios(&scenarios, &settings).await;
            testing::print_summary(&results);

            let failed = results.iter().filter(|r| !r.passed).count();
            if failed > 0 {
                return Err(Error::TestsFailed {
                    failed,
                    total: results.len(),
                });
            }
            Ok(())
        }

        Commands::List { paths } => {
            for path in testing::collect_scenarios(&paths)? {
                print_scenario(&path);
            }
            Ok(())
        }

        Commands::Check { tool, config } => {
            let config = load_config(config.as_deref())?;
            let binary = config.find_tool(tool.as_deref())?;
            let cwd = std::env::current_dir()?;
            let version = Tool::new(Options::new(&binary, cwd)).version().await?;

            if version < MIN_TOOL_VERSION {
                return Err(Error::UnsupportedVersion {
                    found: version.to_string(),
                    reason: format!("terraprobe needs {MIN_TOOL_VERSION} or newer"),
                });
            }

            println!("{} {} {}", "✓".green(), binary.display(), version);
            match paths::config_path() {
                Some(path) if path.exists() => println!("  config: {}", path.display()),
                Some(path) => println!("  config: {} (not present, using defaults)", path.display()),
                None => println!("  config: defaults"),
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn print_scenario(path: &Path) {
    match TestScenario::load(path) {
        Ok(scenario) => {
            let module = scenario.module_dir(path);
            println!(
                "{} {} {}",
                scenario.name.white().bold(),
                format!("[{}]", scenario.lifecycle).cyan(),
                module.display().to_string().dimmed()
            );
            if let Some(desc) = &scenario.description {
                println!("  {}", desc.dimmed());
            }
        }
        Err(e) => println!("{} {}: {}", "✗".red(), path.display(), e),
    }
}
