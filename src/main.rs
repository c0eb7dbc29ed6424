//! terraprobe - scenario runner for Terraform/OpenTofu module tests
//!
//! Runs init/apply/plan/validate against module directories described in
//! YAML scenarios, asserts on the recorded outputs and always destroys what
//! it applied.

use std::path::PathBuf;

use clap::Parser;
use terraprobe::{cli, commands::Commands, common::logging};

#[derive(Parser)]
#[command(name = "terraprobe", about = "Scenario runner for Terraform/OpenTofu modules")]
#[command(version, long_about = None)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Held until exit so buffered file logs are flushed
    let _log_guard = logging::init(cli.log_file.as_deref());

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
