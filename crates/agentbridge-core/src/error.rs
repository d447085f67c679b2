//! Error types for the agent crate.

use agentbridge_auth::AuthError;
use agentbridge_mcp::McpError;
use agentbridge_provider::ProviderError;
use thiserror::Error;

/// Agent error types.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Tool listing or invocation failed.
    #[error("tool error: {0}")]
    Tool(#[from] McpError),

    /// The language model call failed.
    #[error("model error: {0}")]
    Provider(#[from] ProviderError),

    /// Credential strategy could not be set up.
    #[error("credential error: {0}")]
    Credential(#[from] AuthError),

    /// The model kept requesting tools past the iteration bound.
    #[error("tool loop exceeded {limit} model calls")]
    ToolLoopExceeded { limit: usize },

    /// Invalid or incomplete configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl AgentError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AgentError::ToolLoopExceeded { limit: 25 }.to_string(),
            "tool loop exceeded 25 model calls"
        );
        assert_eq!(
            AgentError::config("MCP_ENDPOINT_URL is not set").to_string(),
            "config error: MCP_ENDPOINT_URL is not set"
        );
    }

    #[test]
    fn test_from_conversions() {
        let err: AgentError = McpError::malformed("no body").into();
        assert!(matches!(err, AgentError::Tool(McpError::MalformedResponse(_))));

        let err: AgentError = AuthError::acquisition("401").into();
        assert!(matches!(err, AgentError::Credential(_)));
    }
}
