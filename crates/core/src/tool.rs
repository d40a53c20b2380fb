//! Command executor trait — the abstraction over plugin binaries and shells.
//!
//! The runtime never interprets commands itself. Once an invocation has
//! passed the policy gate and argument validation, its argv is handed to a
//! `CommandExecutor`, which reports the combined output and exit status.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;

/// The result of a finished command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Combined stdout/stderr text
    pub output: String,

    /// Process exit code (`-1` when terminated by a signal)
    pub exit_code: i32,

    /// Wall-clock time spent executing
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes a fully validated argv.
///
/// `argv[0]` names the tool (for example `@coder`, or `sh` for legacy
/// command blocks). Implementations must stop the child process and return
/// [`ToolError::Cancelled`] as soon as `cancel` fires. A non-zero exit is
/// reported as [`ToolError::NonZeroExit`] so callers can fail fast.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        argv: &[String],
        interactive: bool,
    ) -> Result<ExecutionOutput, ToolError>;
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A test executor that echoes its argv back.
    struct EchoExecutor;

    #[async_trait]
    impl CommandExecutor for EchoExecutor {
        async fn execute(
            &self,
            cancel: &CancellationToken,
            argv: &[String],
            _interactive: bool,
        ) -> Result<ExecutionOutput, ToolError> {
            if cancel.is_cancelled() {
                return Err(ToolError::Cancelled(argv.join(" ")));
            }
            Ok(ExecutionOutput {
                output: argv[1..].join(" "),
                exit_code: 0,
                duration: Duration::from_millis(3),
            })
        }
    }

    #[tokio::test]
    async fn executor_runs_argv() {
        let cancel = CancellationToken::new();
        let argv = vec!["@echo".to_string(), "hello".into(), "world".into()];
        let out = EchoExecutor.execute(&cancel, &argv, false).await.unwrap();
        assert!(out.success());
        assert_eq!(out.output, "hello world");
    }

    #[tokio::test]
    async fn executor_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let argv = vec!["@echo".to_string()];
        let err = EchoExecutor.execute(&cancel, &argv, false).await.unwrap_err();
        assert!(matches!(err, ToolError::Cancelled(_)));
    }

    #[test]
    fn execution_output_serializes_duration_as_millis() {
        let out = ExecutionOutput {
            output: "ok".into(),
            exit_code: 0,
            duration: Duration::from_millis(1500),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains(r#""duration":1500"#));
        let back: ExecutionOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
