//! External command leaves.
//!
//! [`CommandTask`] runs a program as a deferred leaf. It is how plan files
//! reach the remote control plane: each step shells out to the cloud CLI of
//! choice. [`CommandStatus`] turns a command's stdout into a status string
//! for the polling waiter.
//!
//! # Quick Start
//!
//! ```rust
//! use fleetops::{CommandTask, TaskTree};
//! use std::time::Duration;
//!
//! let create = CommandTask::builder("aws")
//!     .description("create cluster")
//!     .args(["eks", "create-cluster", "--name", "staging"])
//!     .env("AWS_REGION", "eu-west-1")
//!     .timeout(Duration::from_secs(120))
//!     .build();
//!
//! let mut tree = TaskTree::sequential();
//! tree.append(create);
//! ```
//!
//! # Error Handling
//!
//! - **Non-zero exit code**: [`TaskError::CommandFailed`] with the exit code
//!   and trimmed stderr
//! - **Timeout**: [`TaskError::Timeout`]; the child process is killed
//! - **Spawn failure**: [`TaskError::ExecutionFailed`] (e.g. program not found)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::core::task::{Outcome, Task, TaskError};
use crate::waiter::StatusSource;

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

/// A task that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandTask {
    /// Human-readable summary
    description: String,
    /// Program to execute
    program: String,
    /// Command arguments
    args: Vec<String>,
    /// Extra environment variables
    env: BTreeMap<String, String>,
    /// Working directory
    working_dir: Option<PathBuf>,
    /// Execution timeout
    timeout: Option<Duration>,
}

impl CommandTask {
    /// Create a new builder for a command task.
    pub fn builder(program: impl Into<String>) -> CommandTaskBuilder {
        CommandTaskBuilder::new(program)
    }

    /// Builder for `sh -c <script>`, described by the script itself.
    pub fn shell(script: impl Into<String>) -> CommandTaskBuilder {
        let script = script.into();
        CommandTaskBuilder::new("sh")
            .description(script.clone())
            .arg("-c")
            .arg(script)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the command to completion and capture its output.
    pub async fn run(&self) -> Result<CommandOutput, TaskError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // A timed-out command is dropped; make sure the child goes with it.
        cmd.kill_on_drop(true);

        debug!(program = %self.program, args = ?self.args, "running command");

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| TaskError::Timeout(duration))?,
            None => cmd.output().await,
        }
        .map_err(|e| TaskError::ExecutionFailed(format!("failed to start `{}`: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            Ok(CommandOutput {
                stdout,
                stderr,
                code,
            })
        } else {
            Err(TaskError::CommandFailed {
                code,
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl Task for CommandTask {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn execute(&self) -> Outcome {
        let command = self.clone();
        Outcome::deferred(async move { command.run().await.map(|_| ()) })
    }
}

/// Builder for creating `CommandTask` instances.
#[derive(Debug, Clone)]
pub struct CommandTaskBuilder {
    description: Option<String>,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandTaskBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            description: None,
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Set the description. Defaults to the program name.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Build the `CommandTask`.
    pub fn build(self) -> CommandTask {
        let description = self.description.unwrap_or_else(|| self.program.clone());
        CommandTask {
            description,
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            timeout: self.timeout,
        }
    }
}

/// Reports a resource's status as the trimmed stdout of a command.
#[derive(Debug, Clone)]
pub struct CommandStatus {
    resource: String,
    command: CommandTask,
}

impl CommandStatus {
    pub fn new(resource: impl Into<String>, command: CommandTask) -> Self {
        Self {
            resource: resource.into(),
            command,
        }
    }
}

#[async_trait]
impl StatusSource for CommandStatus {
    fn resource(&self) -> String {
        self.resource.clone()
    }

    async fn status(&self) -> Result<String, TaskError> {
        let output = self.command.run().await?;
        Ok(output.stdout.trim().to_string())
    }
}
