//! `toolgate replay` — Drive a real session from canned model replies.
//!
//! The transcript stands in for the model; everything else is live: the
//! policy files, escalation prompts, plugin binaries and the shell.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use toolgate_agent::{Orchestrator, RunStatus};
use toolgate_config::AppConfig;
use toolgate_core::error::ProviderError;
use toolgate_core::message::Message;
use toolgate_core::provider::Provider;
use toolgate_security::{AuditLogger, TracingSink};
use toolgate_tools::{PluginExecutor, ShellExecutor};
use tracing::info;

use crate::terminal::TerminalOperator;

/// A recorded session: the task and the model's replies in order.
#[derive(Debug, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub task: String,
    pub replies: Vec<String>,
}

/// Provider that answers each turn with the next transcript reply.
pub struct ReplayProvider {
    replies: Mutex<VecDeque<String>>,
}

impl ReplayProvider {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn send_prompt(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        info!(context_messages = messages.len(), exhausted = reply.is_none(), "Replaying reply");
        reply.ok_or_else(|| ProviderError::Exhausted("transcript has no more replies".into()))
    }
}

pub async fn run(
    config: &AppConfig,
    transcript_path: &Path,
    context_files: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let transcript: Transcript = serde_json::from_str(&std::fs::read_to_string(transcript_path)?)
        .map_err(|e| format!("Invalid transcript {}: {e}", transcript_path.display()))?;

    let policy = Arc::new(super::policy_engine(config)?);
    let timeout = Duration::from_secs(config.executor.timeout_secs);
    let mut plugins = PluginExecutor::new(timeout)
        .with_plugins(config.executor.plugins.clone())
        .with_tool_prefix(config.agent.tool_prefix.clone());
    if let Some(dir) = &config.executor.plugin_dir {
        plugins = plugins.with_plugin_dir(dir);
    }
    let shell = ShellExecutor::new(config.executor.shell.clone(), timeout);
    let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));

    let mut context = Vec::with_capacity(context_files.len());
    for path in context_files {
        let content = std::fs::read_to_string(path)?;
        context.push(format!("File: {}\n```\n{}\n```", path.display(), content.trim_end()));
    }

    let orchestrator = Orchestrator::new(
        Arc::new(ReplayProvider::new(transcript.replies)),
        Arc::new(plugins),
        policy,
        Arc::new(TerminalOperator::new()),
    )
    .with_config(config)
    .with_shell_executor(Arc::new(shell))
    .with_audit(audit.clone())
    .with_context(Arc::new(context));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!();
    println!("  Mode:       {}", config.agent.mode);
    println!("  Max turns:  {}", config.agent.effective_max_turns());
    println!("  Context:    {} file(s)", context_files.len());
    println!();

    let mut conversation = orchestrator.new_conversation(transcript.task);
    let outcome = match orchestrator.run(&mut conversation, &cancel).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => {
            eprintln!("\n  Cancelled.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    match outcome.status {
        RunStatus::Completed => println!("  ✅ Completed in {} turn(s)", outcome.turns),
        RunStatus::HandedOff => println!("  ↪ Handed off to legacy commands after {} turn(s)", outcome.turns),
        RunStatus::TurnLimit => println!("  ⚠️  Stopped at the turn limit ({})", outcome.turns),
    }
    println!(
        "     {} command(s) executed, {} format correction(s), {} audit event(s)",
        outcome.invocations_executed,
        outcome.format_corrections,
        audit.count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_parses_with_optional_task() {
        let t: Transcript = serde_json::from_str(r#"{"replies": ["a", "b"]}"#).unwrap();
        assert!(t.task.is_empty());
        assert_eq!(t.replies, ["a", "b"]);
    }

    #[tokio::test]
    async fn replay_provider_runs_out() {
        let provider = ReplayProvider::new(vec!["first".into()]);
        assert_eq!(provider.send_prompt(&[]).await.unwrap(), "first");
        assert!(matches!(
            provider.send_prompt(&[]).await,
            Err(ProviderError::Exhausted(_))
        ));
    }
}
