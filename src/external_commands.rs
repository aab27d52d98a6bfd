#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::{CpiError, Result};
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

pub const MAX_EXTERNAL_OUTPUT_CAPTURE_BYTES: usize = 1_048_576;
const DEFAULT_EXTERNAL_COMMAND_TIMEOUT_SECS: u64 = 300;

pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>>;

/// Exit status plus combined stdout and stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
}

pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> RunFuture<'a>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_EXTERNAL_COMMAND_TIMEOUT_SECS),
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> RunFuture<'a> {
        Box::pin(run_process(program, args, self.timeout))
    }
}

/// Answers every call with a fixed outcome without spawning anything.
#[derive(Debug)]
pub struct StaticRunner {
    outcome: CommandOutput,
    invocations: Mutex<Vec<Vec<String>>>,
}

impl StaticRunner {
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with_outcome(true, String::new())
    }

    #[must_use]
    pub fn failing(output: &str) -> Self {
        Self::with_outcome(false, output.to_string())
    }

    fn with_outcome(success: bool, output: String) -> Self {
        Self {
            outcome: CommandOutput { success, output },
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Program followed by its arguments, one entry per call.
    #[must_use]
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandRunner for StaticRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> RunFuture<'a> {
        let mut invocation = vec![program.to_string()];
        invocation.extend_from_slice(args);
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation);
        let outcome = self.outcome.clone();
        Box::pin(async move { Ok(outcome) })
    }
}

#[derive(Debug, Clone)]
pub struct StreamCapture {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// # Errors
/// Returns `CpiError::Io` when the stream cannot be read.
pub async fn capture_stream_limited<R>(mut stream: R, max_bytes: usize) -> Result<StreamCapture>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut chunk = [0_u8; 8_192];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }

        let remaining = max_bytes.saturating_sub(bytes.len());
        if remaining == 0 {
            truncated = true;
            continue;
        }

        let to_copy = remaining.min(read);
        bytes.extend_from_slice(&chunk[..to_copy]);
        if to_copy < read {
            truncated = true;
        }
    }

    Ok(StreamCapture { bytes, truncated })
}

async fn run_process(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    debug!(program, ?args, "running external command");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| CpiError::Internal(format!("Failed to execute {program}: {err}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CpiError::Internal(format!("Failed to capture {program} stdout")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| CpiError::Internal(format!("Failed to capture {program} stderr")))?;

    let stdout_task = tokio::spawn(capture_stream_limited(
        stdout,
        MAX_EXTERNAL_OUTPUT_CAPTURE_BYTES,
    ));
    let stderr_task = tokio::spawn(capture_stream_limited(
        stderr,
        MAX_EXTERNAL_OUTPUT_CAPTURE_BYTES,
    ));

    let status = if let Ok(wait_result) = tokio::time::timeout(timeout, child.wait()).await {
        wait_result?
    } else {
        let _ = child.kill().await;
        return Err(CpiError::Internal(format!(
            "{program} timed out after {}s",
            timeout.as_secs()
        )));
    };

    let stdout_capture = stdout_task
        .await
        .map_err(|err| CpiError::Internal(format!("Failed to read {program} stdout: {err}")))??;
    let stderr_capture = stderr_task
        .await
        .map_err(|err| CpiError::Internal(format!("Failed to read {program} stderr: {err}")))??;

    let mut output = String::from_utf8_lossy(&stdout_capture.bytes).to_string();
    output.push_str(&String::from_utf8_lossy(&stderr_capture.bytes));
    if stdout_capture.truncated || stderr_capture.truncated {
        output.push_str("\n[output truncated]");
    }

    Ok(CommandOutput {
        success: status.success(),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::{capture_stream_limited, CommandRunner, ProcessRunner};

    #[tokio::test]
    async fn given_stream_larger_than_limit_when_captured_then_output_is_truncated() -> crate::Result<()> {
        let input: &[u8] = b"0123456789";

        let capture = capture_stream_limited(input, 4).await?;

        assert_eq!(capture.bytes, b"0123");
        assert!(capture.truncated);
        Ok(())
    }

    #[tokio::test]
    async fn given_missing_program_when_run_then_internal_error_is_returned() {
        let runner = ProcessRunner::default();

        let result = runner
            .run("photon-cpi-definitely-missing-tool", &[])
            .await;

        assert!(matches!(result, Err(crate::CpiError::Internal(_))));
    }
}
