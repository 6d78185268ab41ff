use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tokio::{process::Command, time};
use tokio_util::sync::CancellationToken;

pub async fn run_cmd(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd).args(args).output().await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let err = String::from_utf8_lossy(&output.stderr);
        let args = args.join(" ");
        Err(eyre!("Failed to run {cmd} {args}. Error {err}"))
    }
}

/// Captured output of a command that is never turned into an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn stderr(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a command and captures stdout/stderr regardless of the exit status.
/// Spawn failures are reported through `stderr`.
pub async fn capture_cmd(cmd: &str, args: &[&str]) -> CmdOutput {
    match Command::new(cmd).args(args).output().await {
        Ok(output) => {
            let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if !output.status.success() && stderr.is_empty() {
                stderr = format!("{cmd} exited with {}", output.status);
            }

            CmdOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr,
            }
        }

        Err(e) => CmdOutput::stderr(format!("failed to spawn {cmd}: {e}")),
    }
}

/// Sleeps for `duration` unless `cancel` fires first. Returns `false` if cancelled.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = time::sleep(duration) => true,
    }
}
