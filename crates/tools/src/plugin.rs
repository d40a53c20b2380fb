//! Plugin executor — runs `@tool` invocations as external binaries.
//!
//! A tool name resolves to a binary in this order:
//! 1. an explicit entry in the configured plugin map (`@coder` or `coder`),
//! 2. `<plugin_dir>/toolgate-<name>`,
//! 3. `toolgate-<name>` on `PATH`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use toolgate_core::error::ToolError;
use toolgate_core::tool::{CommandExecutor, ExecutionOutput};
use tracing::debug;

use crate::process;

/// Prefix of plugin binary file names.
pub const BINARY_PREFIX: &str = "toolgate-";

pub struct PluginExecutor {
    plugins: HashMap<String, PathBuf>,
    plugin_dir: Option<PathBuf>,
    tool_prefix: String,
    timeout: Duration,
}

impl PluginExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            plugins: HashMap::new(),
            plugin_dir: None,
            tool_prefix: "@".into(),
            timeout,
        }
    }

    pub fn with_plugins(mut self, plugins: HashMap<String, PathBuf>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    pub fn with_tool_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tool_prefix = prefix.into();
        self
    }

    /// Resolve a tool name to the binary that implements it.
    pub fn resolve(&self, tool_name: &str) -> Result<PathBuf, ToolError> {
        let bare = tool_name.strip_prefix(&self.tool_prefix).unwrap_or(tool_name);
        if bare.is_empty() || bare.contains(['/', '\\']) {
            return Err(ToolError::InvalidArguments(format!(
                "invalid tool name '{tool_name}'"
            )));
        }

        if let Some(path) = self.plugins.get(tool_name).or_else(|| self.plugins.get(bare)) {
            return Ok(path.clone());
        }

        let binary = format!("{BINARY_PREFIX}{bare}");
        if let Some(dir) = &self.plugin_dir {
            let candidate = dir.join(&binary);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        find_in_path(&binary).ok_or_else(|| ToolError::NotFound(tool_name.to_string()))
    }
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[async_trait]
impl CommandExecutor for PluginExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        argv: &[String],
        interactive: bool,
    ) -> Result<ExecutionOutput, ToolError> {
        let (tool_name, args) = argv
            .split_first()
            .ok_or_else(|| ToolError::InvalidArguments("empty argv".into()))?;
        let binary = self.resolve(tool_name)?;

        debug!(tool = %tool_name, binary = %binary.display(), args = args.len(), "Executing plugin");
        process::run(cancel, tool_name, &binary, args, self.timeout, interactive).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_plugin(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn resolves_from_plugin_map_first() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "toolgate-coder", "echo dir");
        let mapped = PathBuf::from("/opt/coder");
        let exec = PluginExecutor::new(Duration::from_secs(5))
            .with_plugins(HashMap::from([("@coder".to_string(), mapped.clone())]))
            .with_plugin_dir(dir.path());
        assert_eq!(exec.resolve("@coder").unwrap(), mapped);
    }

    #[test]
    fn resolves_from_plugin_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(dir.path(), "toolgate-coder", "echo dir");
        let exec = PluginExecutor::new(Duration::from_secs(5)).with_plugin_dir(dir.path());
        assert_eq!(exec.resolve("@coder").unwrap(), path);
    }

    #[test]
    fn unknown_tool_not_found() {
        let exec = PluginExecutor::new(Duration::from_secs(5));
        assert!(matches!(
            exec.resolve("@definitely-not-installed-xyz"),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn path_traversal_rejected() {
        let exec = PluginExecutor::new(Duration::from_secs(5));
        assert!(matches!(
            exec.resolve("@../bin/sh"),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn executes_plugin_with_args() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "toolgate-coder", r#"echo "$1|$2|$3""#);
        let exec = PluginExecutor::new(Duration::from_secs(5)).with_plugin_dir(dir.path());
        let argv: Vec<String> = ["@coder", "exec", "--cmd", "ls -la"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = exec
            .execute(&CancellationToken::new(), &argv, false)
            .await
            .unwrap();
        assert_eq!(out.output, "exec|--cmd|ls -la");
    }

    #[tokio::test]
    async fn plugin_failure_is_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "toolgate-coder", "echo 'no such file' >&2; exit 2");
        let exec = PluginExecutor::new(Duration::from_secs(5)).with_plugin_dir(dir.path());
        let argv = vec!["@coder".to_string(), "read".into()];
        let err = exec
            .execute(&CancellationToken::new(), &argv, false)
            .await
            .unwrap_err();
        assert_eq!(err.partial_output(), Some("[stderr]: no such file"));
    }
}
