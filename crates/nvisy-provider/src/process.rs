//! Deadline-bounded subprocess execution.
//!
//! Every command runs in a fresh process group. When the deadline passes the
//! whole group is killed, which also reaps helpers the engine spawned itself
//! (`ocrmypdf` forks `tesseract` and `gs`). The child handle is created with
//! `kill_on_drop`, so a cancelled attempt never leaves the direct child behind.

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;

use nvisy_core::provider::{ProviderError, Result};
use tokio::process::Command;
use tokio::time::Instant;

use crate::TRACING_TARGET_PROCESS;

/// Maximum number of stderr bytes kept in error messages.
const STDERR_EXCERPT: usize = 512;

/// Builds a command for `program` with piped output and no stdin.
pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command
}

/// Runs `command` to completion or until `deadline`.
///
/// A program missing from `PATH` is a configuration error; a deadline
/// overrun is transient. Exit status is not inspected here.
pub async fn run(mut command: Command, deadline: Instant) -> Result<Output> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    let allowed = deadline.saturating_duration_since(Instant::now());

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProviderError::configuration(format!("'{program}' is not installed")).with_source(e)
        } else {
            ProviderError::transient(format!("failed to spawn '{program}'")).with_source(e)
        }
    })?;
    let pid = child.id();

    tracing::trace!(target: TRACING_TARGET_PROCESS, program = %program, pid = ?pid, "spawned");

    match tokio::time::timeout_at(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => {
            Err(ProviderError::transient(format!("failed waiting for '{program}'")).with_source(e))
        }
        Err(_) => {
            if let Some(pid) = pid {
                kill_group(pid).await;
            }
            tracing::warn!(
                target: TRACING_TARGET_PROCESS,
                program = %program,
                pid = ?pid,
                allowed_ms = allowed.as_millis() as u64,
                "deadline exceeded, process group killed"
            );
            Err(ProviderError::deadline_exceeded(allowed))
        }
    }
}

/// Runs `command` and fails unless it exits successfully.
pub async fn run_checked(command: Command, deadline: Instant) -> Result<Output> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    let output = run(command, deadline).await?;
    if output.status.success() {
        return Ok(output);
    }
    Err(exit_error(&program, &output))
}

/// Classifies an unsuccessful exit without program-specific knowledge.
///
/// Termination by signal means the engine crashed; a non-zero code is
/// assumed to be about the input.
pub fn exit_error(program: &str, output: &Output) -> ProviderError {
    let stderr = stderr_excerpt(output);
    match output.status.code() {
        None => ProviderError::fatal(format!("'{program}' was terminated by a signal: {stderr}")),
        Some(code) => {
            ProviderError::unsupported_input(format!("'{program}' exited with {code}: {stderr}"))
        }
    }
}

/// Returns the trimmed head of stderr for error messages.
pub fn stderr_excerpt(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    match trimmed.char_indices().nth(STDERR_EXCERPT) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_owned(),
    }
}

#[cfg(unix)]
async fn kill_group(pid: u32) {
    let result = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{pid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match tokio::time::timeout(Duration::from_secs(2), result).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::warn!(target: TRACING_TARGET_PROCESS, pid, error = %e, "group kill failed");
        }
        Err(_) => {
            tracing::warn!(target: TRACING_TARGET_PROCESS, pid, "group kill timed out");
        }
    }
}

#[cfg(not(unix))]
async fn kill_group(_pid: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use nvisy_core::provider::ProviderErrorKind;

    use super::*;

    #[tokio::test]
    async fn collects_output() {
        let mut cmd = command("sh");
        cmd.arg("-c").arg("printf hello");
        let output = run_checked(cmd, Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout, b"hello");
    }

    #[tokio::test]
    async fn kills_on_deadline() {
        let mut cmd = command("sh");
        cmd.arg("-c").arg("sleep 30");
        let started = Instant::now();
        let error = run(cmd, Instant::now() + Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ProviderErrorKind::Transient);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_configuration() {
        let cmd = command("nvisy-definitely-not-installed");
        let error = run(cmd, Instant::now() + Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ProviderErrorKind::Configuration);
    }

    #[tokio::test]
    async fn non_zero_exit_is_unsupported_input() {
        let mut cmd = command("sh");
        cmd.arg("-c").arg("echo broken >&2; exit 3");
        let error = run_checked(cmd, Instant::now() + Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ProviderErrorKind::UnsupportedInput);
        assert!(error.message.contains("broken"));
    }
}
