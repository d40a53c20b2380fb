//! The operator: the human at the terminal.
//!
//! The orchestrator never prints or reads anything itself. It reports
//! [`AgentEvent`]s and asks for decisions through this trait, so the same loop
//! drives a terminal UI, a replay session or a scripted test.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::parser::CommandBlock;

/// An invocation the policy could not decide on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRequest {
    pub tool_name: String,
    /// Canonical command string, as matched against rules.
    pub command: String,
    /// The arguments exactly as the model wrote them.
    pub raw_args: String,
    /// Pattern saved by `AllowAlways` / `DenyForever`.
    pub suggested_pattern: String,
}

/// The operator's answer to an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityDecision {
    RunOnce,
    AllowAlways,
    DenyOnce,
    DenyForever,
}

impl SecurityDecision {
    pub fn allows(self) -> bool {
        matches!(self, SecurityDecision::RunOnce | SecurityDecision::AllowAlways)
    }

    /// Whether the decision is saved as a rule.
    pub fn persists(self) -> bool {
        matches!(self, SecurityDecision::AllowAlways | SecurityDecision::DenyForever)
    }
}

impl fmt::Display for SecurityDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SecurityDecision::RunOnce => "run_once",
            SecurityDecision::AllowAlways => "allow_always",
            SecurityDecision::DenyOnce => "deny_once",
            SecurityDecision::DenyForever => "deny_forever",
        })
    }
}

/// What to do with fenced command blocks in a legacy reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyChoice {
    /// Run the block at this index.
    RunOne(usize),
    /// Run every block in order, stopping at the first failure.
    RunAll,
    /// Run an edited version of the block at `index`.
    Edit { index: usize, script: String },
    /// Show what would run without executing anything.
    Simulate,
    Skip,
}

#[async_trait]
pub trait Operator: Send + Sync {
    /// Show an event. Must not block.
    fn display(&self, event: &AgentEvent);

    /// Ask whether an escalated invocation may run.
    async fn confirm_invocation(
        &self,
        cancel: &CancellationToken,
        request: &EscalationRequest,
    ) -> Result<SecurityDecision, AgentError>;

    /// Ask what to do with legacy command blocks. `blocks` is never empty.
    async fn choose_legacy(
        &self,
        cancel: &CancellationToken,
        blocks: &[CommandBlock],
    ) -> Result<LegacyChoice, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_flags() {
        assert!(SecurityDecision::RunOnce.allows());
        assert!(SecurityDecision::AllowAlways.allows());
        assert!(!SecurityDecision::DenyOnce.allows());
        assert!(!SecurityDecision::DenyForever.allows());

        assert!(SecurityDecision::AllowAlways.persists());
        assert!(SecurityDecision::DenyForever.persists());
        assert!(!SecurityDecision::RunOnce.persists());
    }

    #[test]
    fn decision_display_matches_serde() {
        for decision in [
            SecurityDecision::RunOnce,
            SecurityDecision::AllowAlways,
            SecurityDecision::DenyOnce,
            SecurityDecision::DenyForever,
        ] {
            let json = serde_json::to_string(&decision).unwrap();
            assert_eq!(json, format!("\"{decision}\""));
        }
    }
}
