//! CLI command definitions
//!
//! Defines the clap commands for the terraprobe CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run YAML test scenarios
    Test {
        /// Scenario files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Show every lifecycle step
        #[arg(long, short)]
        verbose: bool,

        /// Scenarios to run concurrently (default from config: 4)
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Tool binary to use instead of the configured/discovered one
        #[arg(long)]
        tool: Option<PathBuf>,

        /// Configuration file to use instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List scenarios without running them
    List {
        /// Scenario files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Check that the infrastructure tool is installed and supported
    Check {
        /// Tool binary to check instead of the configured/discovered one
        #[arg(long)]
        tool: Option<PathBuf>,

        /// Configuration file to use instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
