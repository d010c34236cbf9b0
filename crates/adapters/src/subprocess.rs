// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess capture helpers, sync and async.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors from subprocess execution
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command synchronously and capture its output.
pub fn run_sync(program: &str, args: &[&str], cwd: &Path) -> std::io::Result<CommandOutput> {
    let output = Command::new(program).args(args).current_dir(cwd).output()?;
    Ok(CommandOutput {
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a shell command asynchronously under `bash -c` with fail-fast flags.
///
/// Mirrors how step tool-calls execute: `set -euo pipefail` prepended, env
/// merged over the inherited environment, optional timeout.
pub async fn run_shell(
    command: &str,
    cwd: &Path,
    env: &HashMap<String, String>,
    timeout: Option<Duration>,
) -> Result<CommandOutput, SubprocessError> {
    let wrapped = format!("set -euo pipefail\n{command}");
    let mut cmd = tokio::process::Command::new("bash");
    cmd.arg("-c").arg(&wrapped).current_dir(cwd).envs(env);

    let output_future = cmd.output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, output_future)
            .await
            .map_err(|_| {
                warn!(%command, ?limit, "shell command timed out");
                SubprocessError::Timeout(limit)
            })??,
        None => output_future.await?,
    };

    Ok(CommandOutput {
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
