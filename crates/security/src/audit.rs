//! Audit logging — structured record of every gate decision.
//!
//! Policy decisions, operator escalations, rule changes and tool executions
//! are recorded in memory and forwarded to sinks.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Action;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    /// Who triggered the event: `model` or `operator`
    pub actor: String,
    /// The canonical command or pattern involved
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The policy engine evaluated a tool call
    PolicyDecision { tool_name: String, action: Action },
    /// The operator answered an escalation prompt
    Escalation { tool_name: String, decision: String },
    /// A rule was added or updated
    RuleAdded { action: Action },
    /// A tool was executed
    ToolExecution { tool_name: String },
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
    Escalated,
}

impl From<Action> for AuditOutcome {
    fn from(action: Action) -> Self {
        match action {
            Action::Allow => AuditOutcome::Success,
            Action::Deny => AuditOutcome::Denied,
            Action::Ask => AuditOutcome::Escalated,
        }
    }
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// In-memory audit logger with optional sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        actor: &str,
        target: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target: target.into(),
            outcome,
            details,
        };

        self.lock().push(entry.clone());

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Get entries with the given outcome.
    pub fn entries_by_outcome(&self, outcome: AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| e.outcome == outcome)
            .cloned()
            .collect()
    }

    /// Clear all stored entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            actor = %entry.actor,
            target = %entry.target,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(action: Action) -> AuditEvent {
        AuditEvent::PolicyDecision {
            tool_name: "@coder".into(),
            action,
        }
    }

    #[test]
    fn log_and_retrieve_entries() {
        let logger = AuditLogger::new();
        logger.log(
            decision(Action::Allow),
            "model",
            "@coder read --file main.go",
            Action::Allow.into(),
            None,
        );
        logger.log(
            AuditEvent::Escalation {
                tool_name: "@coder".into(),
                decision: "deny_forever".into(),
            },
            "operator",
            "@coder exec --cmd rm -rf /",
            AuditOutcome::Denied,
            Some("pattern @coder exec".into()),
        );

        assert_eq!(logger.count(), 2);
        let entries = logger.entries();
        assert_eq!(entries[0].actor, "model");
        assert_eq!(entries[1].actor, "operator");
    }

    #[test]
    fn filter_by_outcome() {
        let logger = AuditLogger::new();
        logger.log(decision(Action::Allow), "model", "a", Action::Allow.into(), None);
        logger.log(decision(Action::Deny), "model", "b", Action::Deny.into(), None);
        logger.log(decision(Action::Ask), "model", "c", Action::Ask.into(), None);
        logger.log(
            AuditEvent::ToolExecution {
                tool_name: "@coder".into(),
            },
            "model",
            "a",
            AuditOutcome::Success,
            None,
        );

        assert_eq!(logger.entries_by_outcome(AuditOutcome::Success).len(), 2);
        let denied = logger.entries_by_outcome(AuditOutcome::Denied);
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].target, "b");
        assert_eq!(logger.entries_by_outcome(AuditOutcome::Escalated).len(), 1);
    }

    #[test]
    fn clear_entries() {
        let logger = AuditLogger::new();
        logger.log(decision(Action::Allow), "model", "x", AuditOutcome::Success, None);
        assert_eq!(logger.count(), 1);
        logger.clear();
        assert_eq!(logger.count(), 0);
    }

    #[test]
    fn audit_event_variants_serialize() {
        let events = vec![
            decision(Action::Deny),
            AuditEvent::Escalation {
                tool_name: "@coder".into(),
                decision: "run_once".into(),
            },
            AuditEvent::RuleAdded { action: Action::Allow },
            AuditEvent::ToolExecution {
                tool_name: "@shell".into(),
            },
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let round_tripped: AuditEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(round_tripped, event);
        }

        let json = serde_json::to_string(&decision(Action::Deny)).unwrap();
        assert!(json.contains(r#""type":"policy_decision""#));
        assert!(json.contains(r#""action":"deny""#));
    }

    #[test]
    fn custom_sink_receives_events() {
        use std::sync::Arc;

        struct TestSink {
            received: Arc<Mutex<Vec<String>>>,
        }

        impl AuditSink for TestSink {
            fn record(&self, entry: &AuditEntry) {
                self.received.lock().unwrap().push(entry.target.clone());
            }
        }

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = TestSink {
            received: received.clone(),
        };
        let logger = AuditLogger::with_sinks(vec![Box::new(sink), Box::new(TracingSink)]);
        logger.log(
            AuditEvent::RuleAdded { action: Action::Deny },
            "operator",
            "@coder exec --cmd rm",
            AuditOutcome::Success,
            None,
        );

        let sink_entries = received.lock().unwrap();
        assert_eq!(sink_entries.as_slice(), ["@coder exec --cmd rm"]);
    }

    #[test]
    fn debug_format() {
        let logger = AuditLogger::default();
        let debug_str = format!("{logger:?}");
        assert!(debug_str.contains("AuditLogger"));
        assert!(debug_str.contains("entry_count"));
    }
}
