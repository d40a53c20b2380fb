//! # toolgate core
//!
//! Domain types, collaborator traits, and error definitions for the toolgate
//! tool-call runtime. This crate has no framework dependencies; it defines
//! the domain model every other crate implements against.
//!
//! The runtime talks to two external collaborators through the traits here:
//! - [`Provider`]: sends a conversation to a model and returns its reply text
//! - [`CommandExecutor`]: runs an argv (plugin binary or shell) and reports output

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{ContextSource, Provider};
pub use tool::{CommandExecutor, ExecutionOutput};
