//! MCP error types.

use agentbridge_auth::AuthError;
use thiserror::Error;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The remote engine answered with a JSON-RPC error.
    #[error("Remote error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The response envelope or JSON-RPC frame lacks the expected fields.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Outbound credential could not be produced.
    #[error("Credential error: {0}")]
    Credential(#[from] AuthError),

    /// The remote endpoint answered with a non-success HTTP status.
    #[error("Upstream call failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// Authentication required.
    #[error("Authentication required")]
    AuthRequired,
}

impl McpError {
    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a protocol error.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    /// Create a malformed response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Map a reqwest send failure.
    pub(crate) fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::connection_failed(format!("Connection failed: {e}"))
        } else {
            Self::protocol_error(format!("Request failed: {e}"))
        }
    }
}
