//! Error types for the toolgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for toolgate operations that cross crate boundaries.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// A scripted or replayed provider ran out of replies.
    #[error("Provider exhausted: {0}")]
    Exhausted(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool exited with code {exit_code}: {tool_name}")]
    NonZeroExit {
        tool_name: String,
        exit_code: i32,
        output: String,
    },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool execution cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Output captured before the failure, if the tool produced any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            ToolError::NonZeroExit { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "@coder".into(),
            reason: "binary not executable".into(),
        });
        assert!(err.to_string().contains("@coder"));
        assert!(err.to_string().contains("not executable"));
    }

    #[test]
    fn non_zero_exit_keeps_partial_output() {
        let err = ToolError::NonZeroExit {
            tool_name: "@coder".into(),
            exit_code: 2,
            output: "file not found".into(),
        };
        assert_eq!(err.partial_output(), Some("file not found"));
        assert!(err.to_string().contains("code 2"));
        assert!(ToolError::NotFound("x".into()).partial_output().is_none());
    }
}
