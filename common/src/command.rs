//! Command execution utilities
//!
//! Provides consistent command execution with proper error handling and logging.

use anyhow::{Context, Result};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Result of a command execution.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Exit code as text, or "signal" when the process was killed.
    pub fn code_text(&self) -> String {
        self.code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }

    /// Turn a non-zero exit into a `CommandError`, returning stdout otherwise.
    pub fn into_checked(self, program: &str) -> Result<String, CommandError> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                code: self.code_text(),
                stderr: self.stderr,
            })
        }
    }
}

/// An external process ran but did not succeed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program} failed (exit {code}): {stderr}")]
    Failed {
        program: String,
        code: String,
        stderr: String,
    },
}

/// Run a command and return its output.
///
/// This is a low-level function that returns both stdout and stderr.
/// Use `run_checked` if you want to treat non-zero exit as an error.
#[instrument(skip_all, fields(cmd = %cmd))]
pub async fn run(cmd: &str, args: &[&str]) -> Result<CommandOutput> {
    debug!(args = ?args, "Running command");

    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .context(format!("Failed to execute {}", cmd))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Run a command and return stdout if successful, error otherwise.
///
/// # Example
/// ```ignore
/// let version = run_checked("docker", &["--version"]).await?;
/// ```
pub async fn run_checked(cmd: &str, args: &[&str]) -> Result<String> {
    Ok(run(cmd, args).await?.into_checked(cmd)?)
}

/// Run a command with `input` piped to its stdin.
///
/// Extra environment variables are set on the child only. Stdin is written
/// while output is collected, so large inputs cannot deadlock on a full pipe.
/// If the child exits before reading everything, its exit status wins over
/// the resulting broken-pipe error.
#[instrument(skip_all, fields(cmd = %cmd, input_bytes = input.len()))]
pub async fn run_with_input(
    cmd: &str,
    args: &[&str],
    env: &[(&str, &str)],
    input: &[u8],
) -> Result<CommandOutput> {
    debug!(args = ?args, "Running command with piped input");

    let mut child = Command::new(cmd)
        .args(args)
        .envs(env.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context(format!("Failed to spawn {}", cmd))?;

    let mut stdin = child
        .stdin
        .take()
        .context(format!("Failed to open stdin of {}", cmd))?;

    let write = async move {
        stdin.write_all(input).await?;
        stdin.shutdown().await
    };

    let (written, output) = tokio::join!(write, child.wait_with_output());
    let output = output.context(format!("Failed to wait for {}", cmd))?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        code: output.status.code(),
    };

    if result.success {
        written.context(format!("Failed to write stdin of {}", cmd))?;
    }

    Ok(result)
}

/// Pipe `input` into a command and return stdout if successful.
pub async fn pipe_checked(
    cmd: &str,
    args: &[&str],
    env: &[(&str, &str)],
    input: &[u8],
) -> Result<String> {
    Ok(run_with_input(cmd, args, env, input)
        .await?
        .into_checked(cmd)?)
}
