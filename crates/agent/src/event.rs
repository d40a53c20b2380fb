//! Operator-facing events.
//!
//! `AgentEvent` is everything the orchestrator shows the operator while a
//! session runs: the model's reasoning and response cards, tool progress,
//! corrections and stops. Renderers match on it; it serializes with a
//! `type` tag so events can also be written as JSON lines.

use serde::{Deserialize, Serialize};

/// Events emitted by the orchestrator.
///
/// - `reasoning` / `explanation` / `response`: cards parsed from a reply
/// - `tool_start` / `tool_output` / `tool_error`: one invocation's progress
/// - `format_correction`: a protocol violation was fed back to the model
/// - `policy_denied`: the policy (or the operator) refused an invocation
/// - `batch_interrupted`: remaining invocations of a batch were skipped
/// - `turn_limit`: the turn budget ran out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Reasoning {
        content: String,
    },

    Explanation {
        content: String,
    },

    /// Untagged reply text; the final answer when no tools were called.
    Response {
        content: String,
    },

    ToolStart {
        tool_name: String,
        command: String,
    },

    /// Full (redacted) tool output; the model only sees a truncated copy.
    ToolOutput {
        tool_name: String,
        output: String,
        exit_code: i32,
        duration_ms: u64,
    },

    ToolError {
        tool_name: String,
        message: String,
    },

    FormatCorrection {
        kind: String,
        message: String,
    },

    PolicyDenied {
        tool_name: String,
        command: String,
    },

    BatchInterrupted {
        completed: usize,
        skipped: usize,
    },

    TurnLimit {
        max_turns: u32,
    },
}

impl AgentEvent {
    /// Event name, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Reasoning { .. } => "reasoning",
            Self::Explanation { .. } => "explanation",
            Self::Response { .. } => "response",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolOutput { .. } => "tool_output",
            Self::ToolError { .. } => "tool_error",
            Self::FormatCorrection { .. } => "format_correction",
            Self::PolicyDenied { .. } => "policy_denied",
            Self::BatchInterrupted { .. } => "batch_interrupted",
            Self::TurnLimit { .. } => "turn_limit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_tool_output() {
        let event = AgentEvent::ToolOutput {
            tool_name: "@coder".into(),
            output: "ok".into(),
            exit_code: 0,
            duration_ms: 12,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_output""#));
        assert!(json.contains(r#""duration_ms":12"#));
    }

    #[test]
    fn event_serialization_batch_interrupted() {
        let event = AgentEvent::BatchInterrupted {
            completed: 1,
            skipped: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"batch_interrupted","completed":1,"skipped":2}"#);
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let events = [
            AgentEvent::Reasoning { content: "r".into() },
            AgentEvent::Explanation { content: "e".into() },
            AgentEvent::Response { content: "x".into() },
            AgentEvent::ToolStart {
                tool_name: "@coder".into(),
                command: "@coder list".into(),
            },
            AgentEvent::ToolError {
                tool_name: "@coder".into(),
                message: "boom".into(),
            },
            AgentEvent::FormatCorrection {
                kind: "parse_error".into(),
                message: "m".into(),
            },
            AgentEvent::PolicyDenied {
                tool_name: "@coder".into(),
                command: "@coder exec --cmd rm".into(),
            },
            AgentEvent::TurnLimit { max_turns: 3 },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"response","content":"done"}"#;
        let event: AgentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            AgentEvent::Response {
                content: "done".into()
            }
        );
    }
}
