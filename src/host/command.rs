//! Subprocess execution.
//!
//! Every external tool the agent drives (package manager, `gitlab-ctl`,
//! `pgloader`, hook tools) goes through [`CommandRunner`], so tests can swap
//! in a recording fake. Calls block until the child exits; there is no timeout.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tracing::{debug, instrument};

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl Command {
    /// Create a new command for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Create a command from a binary path
    pub fn from_path(program: &Path) -> Self {
        Self::new(program.display().to_string())
    }

    /// Add an argument to the command
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments to the command
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Program followed by its arguments
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Output from a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands.
///
/// Implementations must return [`Error::ExternalTool`] when the child exits
/// with a nonzero status.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &Command) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    #[instrument(skip(self), fields(command = %command))]
    async fn run(&self, command: &Command) -> Result<CommandOutput> {
        let mut child = tokio::process::Command::new(command.program());
        child.args(command.get_args());
        for (key, value) in command.get_env_vars() {
            child.env(key, value);
        }

        let output = child.output().await.map_err(|e| Error::ExternalTool {
            command: command.to_string(),
            status: None,
            output: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(Error::ExternalTool {
                command: command.to_string(),
                status: output.status.code(),
                output: format!("{stdout}{stderr}").trim().to_string(),
            });
        }

        debug!("Command succeeded");
        Ok(CommandOutput { stdout, stderr })
    }
}
