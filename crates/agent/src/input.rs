//! Cancellable operator input.
//!
//! Terminal reads block, so they run on the blocking pool and race the
//! cancellation token. If the token wins, the read is abandoned; its thread
//! finishes whenever the terminal delivers a line and the result is dropped.

use std::io::{self, BufRead, Write};

use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

/// Run a blocking read on the blocking pool, returning early on cancellation.
pub async fn read_cancellable<F>(cancel: &CancellationToken, read: F) -> Result<String, AgentError>
where
    F: FnOnce() -> io::Result<String> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(read);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        joined = task => match joined {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(AgentError::Input(e.to_string())),
            Err(e) => Err(AgentError::Input(format!("input task failed: {e}"))),
        },
    }
}

/// Print `prompt` and read one line from stdin, without the line ending.
pub async fn prompt_line(cancel: &CancellationToken, prompt: &str) -> Result<String, AgentError> {
    let prompt = prompt.to_string();
    read_cancellable(cancel, move || {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        drop(stdout);

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    })
    .await
}
