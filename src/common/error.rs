//! Error types for terraprobe
//!
//! Messages name the lifecycle verb that failed and carry the tool's own
//! stderr, so a failed scenario can be diagnosed from the summary alone.

use std::io;
use thiserror::Error;

use crate::tool::CommandOutput;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for terraprobe
#[derive(Error, Debug)]
pub enum Error {
    // === Tool Discovery Errors ===
    #[error("Infrastructure tool '{name}' not found. Searched: {searched}")]
    ToolNotFound { name: String, searched: String },

    #[error("Failed to run '{program}': {source}")]
    ToolSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported tool version {found}: {reason}")]
    UnsupportedVersion { found: String, reason: String },

    // === Command Errors ===
    #[error("'{command}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("'{command}' still failing after {attempts} attempts: {reason}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        reason: String,
    },

    #[error("'{command}' timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    // === Output Errors ===
    #[error("Output '{name}' could not be read: {reason}")]
    OutputParse { name: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario '{path}': {reason}")]
    Scenario { path: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    #[error("{failed} of {total} scenarios failed")]
    TestsFailed { failed: usize, total: usize },

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a tool not found error with the names that were tried
    pub fn tool_not_found<S: AsRef<str>>(name: &str, searched: &[S]) -> Self {
        Self::ToolNotFound {
            name: name.to_string(),
            searched: searched
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Create a command failed error from captured process output
    pub fn command_failed(command: &str, output: &CommandOutput) -> Self {
        let stderr = output.stderr.trim();
        Self::CommandFailed {
            command: command.to_string(),
            code: output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none (killed by signal)".to_string()),
            stderr: if stderr.is_empty() {
                output.stdout.trim().to_string()
            } else {
                stderr.to_string()
            },
        }
    }

    /// Create a scenario error
    pub fn scenario(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::Scenario {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_prefers_stderr() {
        let output = CommandOutput {
            stdout: "Plan: 1 to add".to_string(),
            stderr: "Error: Unsupported argument\n".to_string(),
            code: Some(1),
        };
        let err = Error::command_failed("terraform validate", &output);
        assert_eq!(
            err.to_string(),
            "'terraform validate' failed with exit code 1: Error: Unsupported argument"
        );
    }

    #[test]
    fn test_command_failed_falls_back_to_stdout() {
        let output = CommandOutput {
            stdout: "Error: state locked".to_string(),
            stderr: String::new(),
            code: None,
        };
        let err = Error::command_failed("terraform apply", &output);
        assert!(err.to_string().contains("killed by signal"));
        assert!(err.to_string().contains("state locked"));
    }
}
