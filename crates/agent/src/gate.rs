//! The security gate every invocation passes before it runs.
//!
//! Combines the policy decision with operator escalation and records both in
//! the audit log.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolgate_security::{Action, AuditEvent, AuditLogger, AuditOutcome, PolicyEngine, normalize_args};
use tracing::{info, warn};

use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::operator::{EscalationRequest, Operator, SecurityDecision};

/// Outcome of passing an invocation through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Allowed,
    /// Refused; the reason is fed back to the model.
    Denied(String),
}

pub(crate) struct Gate {
    policy: Arc<PolicyEngine>,
    operator: Arc<dyn Operator>,
    audit: Arc<AuditLogger>,
}

impl Gate {
    pub(crate) fn new(
        policy: Arc<PolicyEngine>,
        operator: Arc<dyn Operator>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            policy,
            operator,
            audit,
        }
    }

    pub(crate) fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub(crate) fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    /// Decide whether `tool` may run with `raw_args`, asking the operator when
    /// the policy says `Ask`.
    pub(crate) async fn authorize(
        &self,
        cancel: &CancellationToken,
        tool: &str,
        raw_args: &str,
    ) -> Result<Verdict, AgentError> {
        let command = normalize_args(raw_args).full_command(tool);
        let action = self.policy.check(tool, raw_args);
        self.audit.log(
            AuditEvent::PolicyDecision {
                tool_name: tool.into(),
                action,
            },
            "model",
            &command,
            action.into(),
            None,
        );

        match action {
            Action::Allow => Ok(Verdict::Allowed),
            Action::Deny => {
                warn!(tool = %tool, command = %command, "Invocation denied by policy");
                self.deny_event(tool, &command);
                Ok(Verdict::Denied(format!("blocked by security policy: {command}")))
            }
            Action::Ask => self.escalate(cancel, tool, raw_args, command).await,
        }
    }

    async fn escalate(
        &self,
        cancel: &CancellationToken,
        tool: &str,
        raw_args: &str,
        command: String,
    ) -> Result<Verdict, AgentError> {
        let request = EscalationRequest {
            tool_name: tool.into(),
            suggested_pattern: self.policy.suggested_pattern(tool, raw_args),
            raw_args: raw_args.into(),
            command,
        };
        let decision = self.operator.confirm_invocation(cancel, &request).await?;
        info!(
            tool = %tool,
            command = %request.command,
            decision = %decision,
            "Escalation answered"
        );

        let outcome = if decision.allows() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Denied
        };
        self.audit.log(
            AuditEvent::Escalation {
                tool_name: tool.into(),
                decision: decision.to_string(),
            },
            "operator",
            &request.command,
            outcome,
            decision
                .persists()
                .then(|| format!("pattern {}", request.suggested_pattern)),
        );

        match decision {
            SecurityDecision::RunOnce => Ok(Verdict::Allowed),
            SecurityDecision::AllowAlways => {
                self.save_rule(&request.suggested_pattern, Action::Allow)?;
                Ok(Verdict::Allowed)
            }
            SecurityDecision::DenyOnce => {
                self.deny_event(tool, &request.command);
                Ok(Verdict::Denied(format!("denied by operator: {}", request.command)))
            }
            SecurityDecision::DenyForever => {
                self.save_rule(&request.suggested_pattern, Action::Deny)?;
                self.deny_event(tool, &request.command);
                Ok(Verdict::Denied(format!(
                    "denied by operator (rule saved for '{}'): {}",
                    request.suggested_pattern, request.command
                )))
            }
        }
    }

    fn save_rule(&self, pattern: &str, action: Action) -> Result<(), AgentError> {
        self.policy.add_rule(pattern, action)?;
        self.audit.log(
            AuditEvent::RuleAdded { action },
            "operator",
            pattern,
            AuditOutcome::Success,
            None,
        );
        Ok(())
    }

    fn deny_event(&self, tool: &str, command: &str) {
        self.operator.display(&AgentEvent::PolicyDenied {
            tool_name: tool.into(),
            command: command.into(),
        });
    }
}
