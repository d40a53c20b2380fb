//! Orchestrator errors.
//!
//! Only failures the loop cannot recover from in-band are errors. Format
//! violations, policy denials and tool failures become feedback for the model.

use thiserror::Error;
use toolgate_core::error::ProviderError;
use toolgate_security::PolicyError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The cancellation token fired. Nothing further is appended to history.
    #[error("operation cancelled")]
    Cancelled,

    /// The model call failed; the caller may retry the whole session.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A rule chosen at an escalation prompt could not be persisted.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Reading operator input failed.
    #[error("operator input failed: {0}")]
    Input(String),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}
