//! Process execution for tool invocations
//!
//! The `Executor` trait is the seam between the tool driver and the
//! operating system. The driver only ever sees captured output.

use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::common::{Error, Result};

/// A single tool invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Short form for logs and errors, e.g. `terraform apply`
    pub fn describe(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        match self.args.first() {
            Some(verb) => format!("{program} {verb}"),
            None => program,
        }
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, for error matching
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        }
    }
}

/// Runs tool invocations
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run to completion and capture output
    ///
    /// A non-zero exit is not an error at this level; only failing to
    /// spawn or hitting the timeout is.
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Blocking variant used where no runtime can be awaited (drop handlers)
    fn execute_blocking(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

#[async_trait]
impl<T: Executor + ?Sized> Executor for Arc<T> {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        (**self).execute(invocation).await
    }

    fn execute_blocking(&self, invocation: &Invocation) -> Result<CommandOutput> {
        (**self).execute_blocking(invocation)
    }
}

/// Executor that spawns real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_error = |source| Error::ToolSpawn {
            program: invocation.program.display().to_string(),
            source,
        };

        let output = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| Error::Timeout {
                    command: invocation.describe(),
                    secs: limit.as_secs(),
                })?
                .map_err(spawn_error)?,
            None => cmd.output().await.map_err(spawn_error)?,
        };

        Ok(output.into())
    }

    fn execute_blocking(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let spawn_error = |source| Error::ToolSpawn {
            program: invocation.program.display().to_string(),
            source,
        };

        let mut child = std::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // Drain both pipes while polling so a chatty child cannot block on a full pipe
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match invocation.timeout {
            Some(limit) => wait_with_timeout(&mut child, limit).map_err(spawn_error)?,
            None => Some(child.wait().map_err(spawn_error)?),
        };

        let Some(status) = status else {
            return Err(Error::Timeout {
                command: invocation.describe(),
                secs: invocation.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            });
        };

        Ok(CommandOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
            code: status.code(),
        })
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Wait for `child` up to `limit`; kills it and returns `None` on timeout
fn wait_with_timeout(
    child: &mut std::process::Child,
    limit: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() > limit {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
