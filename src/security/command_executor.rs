//! SafeCommandExecutor: whitelisted external command execution
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: Only pre-approved commands can execute
//! - **Injection prevention**: Arguments are passed as a vector, never through a shell
//! - **Working directory validation**: Validates existence before execution
//! - **Timeout control**: Hanging processes are killed
//!
//! # Example
//!
//! ```rust,no_run
//! use nuget_push::security::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), nuget_push::security::CommandError> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(10));
//!
//! let output = executor.execute("git", &["--version"]).await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```

use crate::core::error::PublishError;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Commands SafeCommandExecutor may run
const ALLOWED_COMMANDS: &[&str] = &["git"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command execution failed (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

impl From<CommandError> for PublishError {
    fn from(error: CommandError) -> Self {
        PublishError::CommandError {
            message: error.to_string(),
        }
    }
}

/// Safe command executor with security controls
#[derive(Debug)]
pub struct SafeCommandExecutor {
    /// Working directory where commands will be executed
    working_dir: PathBuf,
    /// Optional timeout for command execution
    timeout: Option<Duration>,
    allowed: &'static [&'static str],
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor with working directory validation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
            allowed: ALLOWED_COMMANDS,
        })
    }

    /// Set command execution timeout.
    ///
    /// Commands exceeding this duration are killed.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    #[cfg(test)]
    fn with_allowed(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    /// Execute a whitelisted command and capture its output.
    ///
    /// A non-zero exit status is not an error; inspect `Output::status`.
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - Command not in whitelist
    /// - `CommandError::ExecutionFailed` - Binary not found or execution error
    /// - `CommandError::Timeout` - Command ran past the timeout and was killed
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<Output, CommandError> {
        if !self.allowed.contains(&command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, cmd.output())
                .await
                .map_err(|_| CommandError::Timeout(timeout))?,
            None => cmd.output().await,
        };

        output.map_err(|e| CommandError::ExecutionFailed(e.to_string()))
    }
}
