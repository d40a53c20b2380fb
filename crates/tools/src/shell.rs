//! Shell executor — runs legacy fenced command blocks.
//!
//! Used only by the legacy command-block menu. The script is passed to the
//! configured shell with `-c`; nothing is interpreted by toolgate itself.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use toolgate_core::error::ToolError;
use toolgate_core::tool::{CommandExecutor, ExecutionOutput};
use tracing::debug;

use crate::process;

/// Tool name legacy command blocks are checked and audited under.
pub const SHELL_TOOL: &str = "@shell";

/// Execute scripts through `<shell> -c`.
pub struct ShellExecutor {
    shell: String,
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }

    fn platform_shell(&self) -> (&str, &str) {
        if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            (self.shell.as_str(), "-c")
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh", Duration::from_secs(120))
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    /// `argv[0]` is the tool label; the remaining items are joined into the script.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        argv: &[String],
        interactive: bool,
    ) -> Result<ExecutionOutput, ToolError> {
        let script = argv.get(1..).unwrap_or_default().join(" ");
        if script.trim().is_empty() {
            return Err(ToolError::InvalidArguments("empty shell script".into()));
        }

        let (shell, flag) = self.platform_shell();
        debug!(shell = %shell, script = %script, "Executing shell script");
        process::run(cancel, SHELL_TOOL, shell, &[flag, script.as_str()], self.timeout, interactive)
            .await
    }
}
