//! Provider trait — the abstraction over model backends.
//!
//! A Provider knows how to send a conversation to a model and get its reply
//! text back. HTTP clients, credentials and streaming live behind this trait
//! and are not part of the runtime core.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::message::Message;

/// The model collaborator.
///
/// The orchestrator calls `send_prompt()` once per turn with the full
/// outgoing context (stored history plus any transient reminder messages).
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "replay").
    fn name(&self) -> &str;

    /// Send the conversation and return the model's raw reply text.
    async fn send_prompt(&self, messages: &[Message]) -> Result<String, ProviderError>;
}

/// A source of prompt-ready context blocks (file chunks, project notes).
///
/// Blocks are appended to the system prompt when a session starts.
pub trait ContextSource: Send + Sync {
    fn blocks(&self) -> Vec<String>;
}

/// Fixed blocks, mostly useful for tests and the CLI.
impl ContextSource for Vec<String> {
    fn blocks(&self) -> Vec<String> {
        self.clone()
    }
}
