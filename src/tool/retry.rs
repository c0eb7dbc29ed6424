//! Known transient tool errors
//!
//! A failed invocation is retried only when its output contains one of
//! these fragments; anything else fails the scenario immediately.

use serde::Deserialize;

/// An output fragment that marks a failure as transient
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RetryableError {
    /// Substring searched for in the combined stdout/stderr
    pub pattern: String,
    /// Human-readable explanation logged on retry
    pub message: String,
}

impl RetryableError {
    pub fn new(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}

/// Errors the tool hits while fetching providers or talking to plugins
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    ("read: connection reset by peer", "Failed to reach helm charts repository."),
    ("transport is closing", "Failed to reach Kubernetes API."),
    ("unable to verify signature", "Failed to retrieve plugin due to transient network error."),
    ("unable to verify checksum", "Failed to retrieve plugin due to transient network error."),
    ("no provider exists with the given name", "Failed to retrieve plugin due to transient network error."),
    ("registry service is unreachable", "Failed to retrieve plugin due to transient network error."),
    ("Error installing provider", "Failed to install provider due to transient network error."),
    ("Failed to query available provider packages", "Failed to retrieve plugin due to transient network error."),
    ("timeout while waiting for plugin to start", "Failed to retrieve plugin due to transient network error."),
    ("timed out waiting for server handshake", "Tool timed out waiting for a plugin handshake."),
    ("could not query provider registry for", "Failed to retrieve plugin due to transient network error."),
    ("Client.Timeout exceeded while awaiting headers", "Client timed out while awaiting headers."),
];

/// The built-in retryable error table
pub fn default_retryable_errors() -> Vec<RetryableError> {
    DEFAULT_RETRYABLE_ERRORS
        .iter()
        .map(|(pattern, message)| RetryableError::new(*pattern, *message))
        .collect()
}

/// Find the first known transient error present in `output`
pub fn find_retryable<'a>(errors: &'a [RetryableError], output: &str) -> Option<&'a RetryableError> {
    errors.iter().find(|e| output.contains(&e.pattern))
}
