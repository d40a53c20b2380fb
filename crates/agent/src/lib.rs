//! The toolgate agent loop.
//!
//! The model asks for actions with `<tool_call>` tags embedded in its reply.
//! Each turn follows a **Think → Gate → Act → Observe** cycle:
//!
//! 1. **Send** the conversation to the provider
//! 2. **Parse** the reply into reasoning, explanation and a batch of tool calls
//! 3. **Gate** every call through the security policy (asking the operator when needed)
//! 4. **Execute** the sanitized, validated argv and feed a batch summary back
//!
//! The loop ends on a final answer, a legacy command-block hand-off, or the
//! turn limit. Protocol violations are answered with corrective messages
//! rather than errors.

pub mod error;
pub mod event;
pub mod feedback;
mod gate;
pub mod input;
pub mod operator;
pub mod orchestrator;
pub mod parser;
pub mod prompts;

#[cfg(test)]
mod test_helpers;

pub use error::AgentError;
pub use event::AgentEvent;
pub use feedback::{BatchExecutionResult, BatchStatus, InvocationOutcome};
pub use operator::{EscalationRequest, LegacyChoice, Operator, SecurityDecision};
pub use orchestrator::{Orchestrator, RunOutcome, RunStatus};
pub use parser::{
    CommandBlock, ParseError, ParsedReply, Segment, ToolInvocationRequest, extract_command_blocks,
    parse_reply, segments,
};
pub use prompts::Correction;
