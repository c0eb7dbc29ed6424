//! Infrastructure tool driver
//!
//! Issues the fixed lifecycle verbs (init, apply, destroy, plan, validate,
//! output) to Terraform or OpenTofu and turns their results into typed
//! values. Nothing here understands HCL or state; the tool owns all of that.

mod args;
mod exec;
mod options;
mod retry;

#[cfg(test)]
pub(crate) use exec::fake;
pub use exec::{CommandOutput, Executor, Invocation, ProcessExecutor};
pub use options::{Options, DEFAULT_MAX_RETRIES, DEFAULT_TIME_BETWEEN_RETRIES};
pub use retry::{default_retryable_errors, find_retryable, RetryableError};

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::common::{Error, Result};

/// Plan exit code: succeeded, nothing to change
pub const PLAN_NO_CHANGES: i32 = 0;

/// Plan exit code: succeeded, changes pending
pub const PLAN_CHANGES_PENDING: i32 = 2;

/// Outputs of a map-typed output, with non-string values kept as JSON text
pub type OutputMap = BTreeMap<String, String>;

/// A tool bound to one scenario's options
#[derive(Debug)]
pub struct Tool<E = ProcessExecutor> {
    options: Options,
    executor: E,
}

impl Tool<ProcessExecutor> {
    pub fn new(options: Options) -> Self {
        Self::with_executor(options, ProcessExecutor)
    }
}

impl<E: Executor> Tool<E> {
    pub fn with_executor(options: Options, executor: E) -> Self {
        Self { options, executor }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run `init`
    pub async fn init(&self) -> Result<String> {
        self.run(args::init(&self.options), &[0]).await.map(|o| o.stdout)
    }

    /// Run `apply`
    pub async fn apply(&self) -> Result<String> {
        self.run(args::apply(&self.options), &[0]).await.map(|o| o.stdout)
    }

    /// Run `init` then `apply`
    pub async fn init_and_apply(&self) -> Result<String> {
        self.init().await?;
        self.apply().await
    }

    /// Run `destroy`
    pub async fn destroy(&self) -> Result<String> {
        self.run(args::destroy(&self.options), &[0]).await.map(|o| o.stdout)
    }

    /// Run `validate`
    pub async fn validate(&self) -> Result<String> {
        self.run(args::validate(&self.options), &[0]).await.map(|o| o.stdout)
    }

    /// Run `plan` with a detailed exit code
    ///
    /// Returns [`PLAN_NO_CHANGES`] or [`PLAN_CHANGES_PENDING`]; any other
    /// exit code is an error.
    pub async fn plan_exit_code(&self) -> Result<i32> {
        let output = self
            .run(
                args::plan(&self.options),
                &[PLAN_NO_CHANGES, PLAN_CHANGES_PENDING],
            )
            .await?;
        output
            .code
            .ok_or_else(|| Error::Internal("plan finished without an exit code".to_string()))
    }

    /// Read a map-typed output
    pub async fn output_map(&self, name: &str) -> Result<OutputMap> {
        let raw = self.output_json(name).await?;
        parse_output_map(name, &raw)
    }

    /// Read an output as raw JSON text
    pub async fn output_json(&self, name: &str) -> Result<String> {
        let output = self.run(args::output(name), &[0]).await?;
        let raw = output.stdout.trim().to_string();
        serde_json::from_str::<Value>(&raw).map_err(|e| Error::OutputParse {
            name: name.to_string(),
            reason: format!("not valid JSON: {e}"),
        })?;
        Ok(raw)
    }

    /// Query the tool's version
    pub async fn version(&self) -> Result<semver::Version> {
        let output = self.run(args::version(), &[0]).await?;
        parse_version(&output.stdout)
    }

    /// Run one verb, retrying known transient failures
    ///
    /// `accepted` lists the exit codes that count as success.
    async fn run(&self, args: Vec<String>, accepted: &[i32]) -> Result<CommandOutput> {
        let invocation = self.options.invocation(args);
        let command = invocation.describe();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                command = %command,
                attempt,
                dir = %self.options.working_dir().display(),
                "Running tool"
            );

            let output = self.executor.execute(&invocation).await?;
            if output.code.is_some_and(|code| accepted.contains(&code)) {
                tracing::debug!(command = %command, code = ?output.code, "Tool finished");
                return Ok(output);
            }

            let Some(known) = find_retryable(self.options.retryable_errors(), &output.combined())
            else {
                return Err(Error::command_failed(&command, &output));
            };

            if attempt > self.options.max_retries() {
                return Err(Error::RetriesExhausted {
                    command,
                    attempts: attempt,
                    reason: known.message.clone(),
                });
            }

            tracing::warn!(
                command = %command,
                attempt,
                reason = %known.message,
                "Transient tool error, retrying in {:?}",
                self.options.time_between_retries()
            );
            tokio::time::sleep(self.options.time_between_retries()).await;
        }
    }

    /// Blocking `destroy`, for drop handlers that cannot await
    pub fn destroy_blocking(&self) -> Result<()> {
        let invocation = self.options.invocation(args::destroy(&self.options));
        let output = self.executor.execute_blocking(&invocation)?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::command_failed(&invocation.describe(), &output))
        }
    }
}

/// Parse `output -json` of a map into string values
fn parse_output_map(name: &str, raw: &str) -> Result<OutputMap> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(fields) = value else {
        return Err(Error::OutputParse {
            name: name.to_string(),
            reason: format!("expected a map, got {raw}"),
        });
    };

    Ok(fields
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}

#[derive(Deserialize)]
struct VersionJson {
    terraform_version: String,
}

/// Parse `version -json` (Terraform and OpenTofu share the key name)
fn parse_version(raw: &str) -> Result<semver::Version> {
    let parsed: VersionJson = serde_json::from_str(raw.trim())?;
    semver::Version::parse(&parsed.terraform_version).map_err(|e| Error::UnsupportedVersion {
        found: parsed.terraform_version.clone(),
        reason: e.to_string(),
    })
}
