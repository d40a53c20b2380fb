//! Child process runner shared by the executors.
//!
//! Every run races three things: the child finishing, the timeout, and the
//! cancellation token. Losing the race drops the child, and `kill_on_drop`
//! makes sure it does not outlive the call.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use toolgate_core::error::ToolError;
use toolgate_core::tool::ExecutionOutput;
use tracing::{debug, warn};

/// Run `program args...` to completion.
///
/// Interactive runs inherit the terminal and capture no output. Non-interactive
/// runs capture stdout and stderr into one string. A non-zero exit is returned
/// as [`ToolError::NonZeroExit`] carrying the captured output.
pub(crate) async fn run<S: AsRef<OsStr>>(
    cancel: &CancellationToken,
    tool_name: &str,
    program: impl AsRef<OsStr>,
    args: &[S],
    timeout: Duration,
    interactive: bool,
) -> Result<ExecutionOutput, ToolError> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if interactive {
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
    } else {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    }

    let child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolError::NotFound(tool_name.to_string()),
        _ => ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        },
    })?;

    debug!(tool = %tool_name, interactive, "Spawned child process");
    let started = Instant::now();

    let output = tokio::select! {
        result = child.wait_with_output() => result.map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        })?,
        () = tokio::time::sleep(timeout) => {
            warn!(tool = %tool_name, timeout_secs = timeout.as_secs(), "Command timed out");
            return Err(ToolError::Timeout {
                tool_name: tool_name.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        () = cancel.cancelled() => {
            debug!(tool = %tool_name, "Command cancelled");
            return Err(ToolError::Cancelled(tool_name.to_string()));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (_, true) => stdout.trim_end().to_string(),
        (true, false) => format!("[stderr]: {}", stderr.trim_end()),
        (false, false) => format!("{}\n[stderr]: {}", stdout.trim_end(), stderr.trim_end()),
    };

    let exit_code = output.status.code().unwrap_or(-1);
    if exit_code != 0 {
        warn!(tool = %tool_name, exit_code, "Command failed");
        return Err(ToolError::NonZeroExit {
            tool_name: tool_name.to_string(),
            exit_code,
            output: combined,
        });
    }

    Ok(ExecutionOutput {
        output: combined,
        exit_code,
        duration: started.elapsed(),
    })
}
